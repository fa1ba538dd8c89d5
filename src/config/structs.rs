use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// 工时取整方式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumIter, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RoundingMode {
    /// 四舍五入，恰好一半时向上
    #[default]
    Nearest,
    Up,
    Down,
}

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 优先级：ENV > config.toml > 默认值
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub payroll: PayrollConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub postgrid: PostGridConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// ENV 前缀：NESTOGY，分隔符：__
    /// 示例：NESTOGY__SERVER__PORT=9000
    pub fn load(path: Option<&str>) -> Self {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("NESTOGY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("# Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 慢请求阈值（毫秒），超过后记录 warn 日志
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 为空时启动阶段生成随机密钥（重启后所有 token 失效）
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_minutes")]
    pub token_minutes: u64,
    #[serde(default = "default_login_rate_per_minute")]
    pub login_rate_per_minute: u32,
}

/// Webhook 接收配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default = "default_webhook_rate_per_second")]
    pub rate_per_second: u64,
    #[serde(default = "default_webhook_burst")]
    pub burst: u32,
    #[serde(default = "default_webhook_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// 后台任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_job_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_job_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// 员工考勤取整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollConfig {
    /// 0 或 1 表示不取整
    #[serde(default = "default_rounding_increment")]
    pub rounding_increment_minutes: u32,
    #[serde(default)]
    pub rounding_mode: RoundingMode,
}

/// 计费配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_hourly_rate_cents")]
    pub default_hourly_rate_cents: i64,
    #[serde(default)]
    pub default_tax_rate_bp: i32,
    #[serde(default = "default_payment_terms_days")]
    pub payment_terms_days: u32,
}

/// PostGrid 纸质邮件服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostGridConfig {
    #[serde(default = "default_postgrid_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_postgrid_timeout_secs")]
    pub timeout_secs: u64,
}

/// 短信服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SmsProvider {
    Twilio,
    /// Vonage（原 Nexmo）
    Nexmo,
}

/// 短信通知配置；未设置 provider 时不发送短信
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub provider: Option<SmsProvider>,
    /// Twilio Account SID / Nexmo API key
    #[serde(default)]
    pub account_id: Option<String>,
    /// Twilio Auth Token / Nexmo API secret
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    /// 覆盖服务商的默认 API 地址
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_sms_timeout_secs")]
    pub timeout_secs: u64,
}

/// 单个 OAuth2 服务商的客户端凭据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// 邮箱账户 OAuth2 关联配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub google: OAuthClientConfig,
    #[serde(default)]
    pub microsoft: OAuthClientConfig,
    /// Microsoft 租户，默认 common
    #[serde(default = "default_microsoft_tenant")]
    pub microsoft_tenant: String,
    /// 授权 state 的有效期
    #[serde(default = "default_oauth_state_minutes")]
    pub state_minutes: i64,
    #[serde(default = "default_oauth_timeout_secs")]
    pub timeout_secs: u64,
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
    #[serde(default)]
    pub allow_credentials: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_slow_request_ms() -> u64 {
    1000
}

fn default_database_url() -> String {
    "sqlite://nestogy.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_token_minutes() -> u64 {
    480
}

fn default_login_rate_per_minute() -> u32 {
    10
}

fn default_webhook_rate_per_second() -> u64 {
    20
}

fn default_webhook_burst() -> u32 {
    50
}

fn default_webhook_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_job_retry_base_delay_ms() -> u64 {
    500
}

fn default_job_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_rounding_increment() -> u32 {
    15
}

fn default_hourly_rate_cents() -> i64 {
    15_000
}

fn default_payment_terms_days() -> u32 {
    30
}

fn default_postgrid_api_url() -> String {
    "https://api.postgrid.com/print-mail/v1".to_string()
}

fn default_postgrid_timeout_secs() -> u64 {
    20
}

fn default_sms_timeout_secs() -> u64 {
    10
}

fn default_microsoft_tenant() -> String {
    "common".to_string()
}

fn default_oauth_state_minutes() -> i64 {
    10
}

fn default_oauth_timeout_secs() -> u64 {
    15
}

fn default_cors_headers() -> Vec<String> {
    vec![
        "Content-Type".to_string(),
        "Authorization".to_string(),
        "Accept".to_string(),
    ]
}

fn default_cors_max_age() -> u64 {
    3600
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            slow_request_ms: default_slow_request_ms(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_minutes: default_token_minutes(),
            login_rate_per_minute: default_login_rate_per_minute(),
        }
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_webhook_rate_per_second(),
            burst: default_webhook_burst(),
            max_body_bytes: default_webhook_max_body_bytes(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_job_retry_base_delay_ms(),
            retry_max_delay_ms: default_job_retry_max_delay_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            rounding_increment_minutes: default_rounding_increment(),
            rounding_mode: RoundingMode::default(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_hourly_rate_cents: default_hourly_rate_cents(),
            default_tax_rate_bp: 0,
            payment_terms_days: default_payment_terms_days(),
        }
    }
}

impl Default for PostGridConfig {
    fn default() -> Self {
        Self {
            api_url: default_postgrid_api_url(),
            api_key: None,
            webhook_secret: None,
            timeout_secs: default_postgrid_timeout_secs(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            provider: None,
            account_id: None,
            auth_token: None,
            from_number: None,
            api_url: None,
            timeout_secs: default_sms_timeout_secs(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            google: OAuthClientConfig::default(),
            microsoft: OAuthClientConfig::default(),
            microsoft_tenant: default_microsoft_tenant(),
            state_minutes: default_oauth_state_minutes(),
            timeout_secs: default_oauth_timeout_secs(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_headers: default_cors_headers(),
            max_age: default_cors_max_age(),
            allow_credentials: false,
        }
    }
}
