use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Result as ActixResult, web};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, trace};

use crate::api::response::json_response;
use crate::services::AppServices;

/// 应用启动时间
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

impl Default for AppStartTime {
    fn default() -> Self {
        Self {
            start_datetime: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatabaseCheck {
    pub status: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: i64,
    pub database: DatabaseCheck,
    /// 任务队列剩余容量
    pub job_queue_free_slots: usize,
    pub response_time_ms: u128,
}

/// GET /health
///
/// 数据库 ping 超时 5 秒；不健康时返回 503。
pub async fn health_check(
    services: web::Data<AppServices>,
    app_start_time: web::Data<AppStartTime>,
) -> ActixResult<HttpResponse> {
    let start_time = Instant::now();
    trace!("Received health check request");

    let backend = services.storage.backend_name().to_string();
    let database = match tokio::time::timeout(Duration::from_secs(5), services.storage.ping()).await
    {
        Ok(Ok(())) => DatabaseCheck {
            status: "healthy",
            backend,
            error: None,
        },
        Ok(Err(e)) => {
            error!("Database health check failed: {}", e);
            DatabaseCheck {
                status: "unhealthy",
                backend,
                error: Some(e.message().to_string()),
            }
        }
        Err(_) => {
            error!("Database health check timeout");
            DatabaseCheck {
                status: "unhealthy",
                backend,
                error: Some("timeout".to_string()),
            }
        }
    };

    let now = chrono::Utc::now();
    let healthy = database.status == "healthy";
    let data = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: now.to_rfc3339(),
        uptime_seconds: (now - app_start_time.start_datetime).num_seconds().max(0),
        database,
        job_queue_free_slots: services.jobs.capacity(),
        response_time_ms: start_time.elapsed().as_millis(),
    };

    let (status, message) = if healthy {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
    };
    Ok(json_response(status, message, Some(data)))
}

pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(health_check))
        .route("", web::head().to(health_check))
}
