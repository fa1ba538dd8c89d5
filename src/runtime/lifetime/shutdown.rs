use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::startup::StartupContext;
use crate::config::get_config;

/// 关闭总超时（秒），在 worker 排空超时之外留出余量
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// 事件监听器等待超时（秒）
const LISTENER_TIMEOUT_SECS: u64 = 5;

/// 等待 Ctrl+C
pub async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, draining background work...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 停止 worker 并等待后台任务结束
pub async fn perform_shutdown(ctx: StartupContext) {
    let drain_secs = get_config().jobs.drain_timeout_secs;
    let total = Duration::from_secs(drain_secs + LISTENER_TIMEOUT_SECS + SHUTDOWN_GRACE_SECS);

    match timeout(total, perform_shutdown_tasks(ctx)).await {
        Ok(()) => info!("All shutdown tasks completed successfully"),
        Err(_) => error!(
            "Shutdown tasks timed out after {} seconds, exiting anyway",
            total.as_secs()
        ),
    }
}

async fn perform_shutdown_tasks(ctx: StartupContext) {
    let StartupContext {
        services,
        worker_shutdown,
        worker_handle,
    } = ctx;

    // worker 收到信号后自行在 drain_timeout_secs 内清空队列
    if worker_shutdown.send(true).is_err() {
        warn!("Job worker already stopped");
    }
    if let Err(e) = worker_handle.await {
        error!("Job worker task failed: {}", e);
    } else {
        info!("Job worker stopped");
    }

    match timeout(
        Duration::from_secs(LISTENER_TIMEOUT_SECS),
        services.events.wait_idle(),
    )
    .await
    {
        Ok(()) => info!("Event listeners finished"),
        Err(_) => error!(
            "Event listeners still running after {} seconds",
            LISTENER_TIMEOUT_SECS
        ),
    }
}
