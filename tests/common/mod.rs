//! 集成测试共用的环境初始化
//!
//! 每个测试使用独立的临时 SQLite 数据库；事件同步分发，
//! 任务队列的接收端交给测试自己消费。

#![allow(dead_code)]

use std::sync::{Arc, Once};

use tempfile::TempDir;

use nestogy::config::{OAuthClientConfig, StaticConfig, replace_config};
use nestogy::events::{DispatchMode, EventBus};
use nestogy::jobs::{JobQueue, JobReceiver, JobRunner};
use nestogy::services::tenancy::CreateCompanyRequest;
use nestogy::services::{AppServices, TenantContext};
use nestogy::storage::SeaOrmStorage;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const POSTGRID_SECRET: &str = "postgrid-test-secret";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";
pub const GOOGLE_CLIENT_ID: &str = "google-test-client";

static INIT: Once = Once::new();

/// 全局配置：固定 JWT 密钥、关闭重试等待、关闭取整之外的默认值
pub fn init_static_config() {
    INIT.call_once(|| {
        let mut config = StaticConfig::default();
        config.auth.jwt_secret = JWT_SECRET.to_string();
        config.postgrid.webhook_secret = Some(POSTGRID_SECRET.to_string());
        config.database.pool_size = 4;
        config.jobs.retry_base_delay_ms = 1;
        config.jobs.retry_max_delay_ms = 5;
        config.billing.default_hourly_rate_cents = 12_000;
        config.billing.default_tax_rate_bp = 0;
        // 只配置 Google；Microsoft 用来测试未配置的情况
        config.oauth.google = OAuthClientConfig {
            client_id: Some(GOOGLE_CLIENT_ID.to_string()),
            client_secret: Some("google-test-secret".to_string()),
            redirect_uri: Some("https://psa.example.test/oauth/google/callback".to_string()),
        };
        replace_config(config);
    });
}

pub struct TestEnv {
    pub services: Arc<AppServices>,
    pub jobs: JobReceiver,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_queue_capacity(16).await
    }

    /// 指定任务队列容量（测试队列已满的情况）
    pub async fn with_queue_capacity(capacity: usize) -> Self {
        init_static_config();
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());

        let storage = Arc::new(
            SeaOrmStorage::new(&db_url, "sqlite")
                .await
                .expect("Failed to create storage"),
        );
        let events = Arc::new(EventBus::new(DispatchMode::Inline));
        let (queue, jobs) = JobQueue::new(capacity);
        let services = AppServices::with_listeners(storage, events, queue);

        Self {
            services,
            jobs,
            _dir: dir,
        }
    }

    /// 创建租户并返回管理员上下文
    pub async fn company(&self, name: &str, admin_email: &str) -> TenantContext {
        let (company, admin) = self
            .services
            .auth
            .create_company(CreateCompanyRequest {
                name: name.to_string(),
                currency: "USD".to_string(),
                admin_name: format!("{} Admin", name),
                admin_email: admin_email.to_string(),
                admin_password: ADMIN_PASSWORD.to_string(),
            })
            .await
            .expect("Failed to create company");
        TenantContext::new(company.id, admin.id, nestogy::models::Role::Admin)
    }

    /// 依次执行队列中已有的任务，返回执行数量
    pub async fn run_queued_jobs(&mut self) -> usize {
        let runner = JobRunner::new(self.services.clone());
        let mut count = 0;
        while let Ok(job) = self.jobs.try_recv() {
            runner.execute(job).await;
            count += 1;
        }
        count
    }
}

/// 完整路由的测试服务
#[macro_export]
macro_rules! test_app {
    ($env:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::from($env.services.clone()))
                .app_data(actix_web::web::Data::new(
                    nestogy::api::services::AppStartTime::default(),
                ))
                .configure(nestogy::api::services::configure),
        )
        .await
    };
}

/// 登录并返回 Bearer token
#[macro_export]
macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(serde_json::json!({ "email": $email, "password": $password }))
            .to_request();
        let body: serde_json::Value = actix_web::test::call_and_read_body_json(&$app, req).await;
        body["data"]["token"]
            .as_str()
            .expect("login should return a token")
            .to_string()
    }};
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
