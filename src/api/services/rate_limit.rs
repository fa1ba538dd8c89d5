//! 基于 actix-governor 的限流器
//!
//! 登录按客户端 IP 每分钟限流；webhook 接收端按来源 IP 每秒限流。
//! 超限返回 429 Too Many Requests。

use std::time::Duration;

use actix_governor::{Governor, GovernorConfigBuilder, KeyExtractor, SimpleKeyExtractionError};
use actix_web::dev::ServiceRequest;
use governor::middleware::NoOpMiddleware;
use tracing::debug;

use crate::config::get_config;

/// 以连接 IP 为 key；取不到 peer 地址时（如单元测试）归为同一个桶
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = String;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> Result<Self::Key, Self::KeyExtractionError> {
        Ok(req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

/// 每个周期补充一个令牌，最多 `burst` 个
fn build_limiter(period: Duration, burst: u32) -> Governor<ClientIpKeyExtractor, NoOpMiddleware> {
    let period = period.max(Duration::from_millis(1));
    let config = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst.max(1))
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .expect("period and burst are clamped to non-zero values");
    Governor::new(&config)
}

/// 登录限流：`auth.login_rate_per_minute` 次/分钟，允许同等突发
pub fn login_rate_limiter() -> Governor<ClientIpKeyExtractor, NoOpMiddleware> {
    let per_minute = get_config().auth.login_rate_per_minute.max(1);
    debug!("Login rate limiter created: {} req/min", per_minute);
    build_limiter(Duration::from_secs(60) / per_minute, per_minute)
}

/// Webhook 限流：`webhooks.rate_per_second` 次/秒，突发 `webhooks.burst`
pub fn webhook_rate_limiter() -> Governor<ClientIpKeyExtractor, NoOpMiddleware> {
    let config = get_config();
    let per_second = config.webhooks.rate_per_second.max(1);
    debug!(
        "Webhook rate limiter created: {} req/s, burst {}",
        per_second, config.webhooks.burst
    );
    build_limiter(
        Duration::from_micros(1_000_000 / per_second),
        config.webhooks.burst,
    )
}
