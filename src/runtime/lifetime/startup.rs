use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::jwt::get_jwt_service;
use crate::config::get_config;
use crate::events::{DispatchMode, EventBus};
use crate::jobs::{JobQueue, JobWorker, requeue_pending_events};
use crate::services::AppServices;
use crate::storage::StorageFactory;

/// 服务器启动后持有的运行时对象
pub struct StartupContext {
    pub services: Arc<AppServices>,
    /// 通知 worker 停止接收新任务
    pub worker_shutdown: watch::Sender<bool>,
    pub worker_handle: JoinHandle<()>,
}

/// 准备服务器启动的上下文
///
/// 顺序：存储（含迁移）→ 事件总线 → 任务队列 → 服务与监听器 →
/// 启动 worker → 回填 pending webhook 事件。
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {:?}", e))?;

    let config = get_config();

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let events = Arc::new(EventBus::new(DispatchMode::Spawn));
    let (jobs, receiver) = JobQueue::new(config.jobs.queue_capacity);
    let services = AppServices::with_listeners(storage, events, jobs);

    // 提前初始化，空密钥时在启动阶段就打印警告
    let _ = get_jwt_service();

    let (worker_shutdown, shutdown_rx) = watch::channel(false);
    let worker = JobWorker::new(services.clone(), receiver);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // worker 已在运行，队列满时 enqueue 会等待而不是卡死
    match requeue_pending_events(&services).await {
        Ok(0) => debug!("No pending webhook events to re-enqueue"),
        Ok(_) => {}
        Err(e) => {
            error!("Failed to re-enqueue pending webhook events: {}", e);
            warn!("Pending events stay in the database and will be retried on next start");
        }
    }

    info!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        services,
        worker_shutdown,
        worker_handle,
    })
}

/// CLI 模式的服务集合：事件同步分发，任务队列只占位
///
/// CLI 命令不入队后台任务；队列接收端被丢弃，误入队会立刻返回 QueueFull。
pub async fn prepare_cli_services() -> Result<Arc<AppServices>> {
    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    let events = Arc::new(EventBus::new(DispatchMode::Inline));
    let (jobs, _receiver) = JobQueue::new(1);
    Ok(AppServices::with_listeners(storage, events, jobs))
}
