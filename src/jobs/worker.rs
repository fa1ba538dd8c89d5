use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{Job, JobReceiver};
use crate::config::get_config;
use crate::errors::{NestogyError, Result};
use crate::services::AppServices;
use crate::services::webhook_events::{self, POSTGRID_SOURCE, parse_rmm_source};
use crate::storage::backend::retry::exponential_delay;
use migration::entities::failed_job;

/// 执行单个任务（含重试和失败记录）
#[derive(Clone)]
pub struct JobRunner {
    services: Arc<AppServices>,
}

impl JobRunner {
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    async fn run_once(&self, job: &Job) -> Result<()> {
        match job {
            Job::ProcessRmmEvent { event_id } => self.services.rmm.process_event(*event_id).await,
            Job::ProcessMailEvent { event_id } => self.services.mail.process_event(*event_id).await,
            Job::SubmitMailOrder { order_id } => self.services.mail.submit_order(*order_id).await,
            Job::SendSms { company_id, to, body } => self
                .services
                .notifications
                .deliver_sms(*company_id, to, body)
                .await
                .map(|_| ()),
        }
    }

    /// 按配置重试；全部失败后写入 failed_jobs。成功返回 true
    pub async fn execute(&self, job: Job) -> bool {
        let config = get_config().jobs.clone();
        let max_attempts = config.max_attempts.max(1);
        let span = info_span!("job", name = job.name());

        async {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.run_once(&job).await {
                    Ok(()) => {
                        debug!("Job {} finished (attempt {})", job.name(), attempt);
                        return true;
                    }
                    Err(e) if attempt < max_attempts => {
                        let delay = exponential_delay(
                            attempt,
                            config.retry_base_delay_ms,
                            config.retry_max_delay_ms,
                        );
                        warn!(
                            "Job {} failed (attempt {}/{}): {}; retrying in {} ms",
                            job.name(),
                            attempt,
                            max_attempts,
                            e,
                            delay
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    Err(e) => {
                        error!(
                            "Job {} failed permanently after {} attempts: {}",
                            job.name(),
                            attempt,
                            e
                        );
                        if let Err(record_err) = self.record_failure(&job, &e, attempt).await {
                            error!("Could not record failed job {}: {}", job.name(), record_err);
                        }
                        return false;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn record_failure(&self, job: &Job, err: &NestogyError, attempts: u32) -> Result<()> {
        failed_job::ActiveModel {
            job_name: Set(job.name().to_string()),
            payload: Set(job.to_json()),
            error: Set(err.to_string()),
            attempts: Set(attempts as i32),
            failed_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.services.storage.get_db())
        .await?;
        Ok(())
    }
}

/// 单 worker：顺序消费任务，收到关闭信号后在超时内清空队列
pub struct JobWorker {
    runner: JobRunner,
    receiver: JobReceiver,
}

impl JobWorker {
    pub fn new(services: Arc<AppServices>, receiver: JobReceiver) -> Self {
        Self {
            runner: JobRunner::new(services),
            receiver,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            runner,
            mut receiver,
        } = self;
        info!("Job worker started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                job = receiver.recv() => match job {
                    Some(job) => {
                        runner.execute(job).await;
                    }
                    None => {
                        info!("Job queue closed, worker exiting");
                        return;
                    }
                }
            }
        }

        // 不再接收新任务，处理剩余任务
        receiver.close();
        let timeout = Duration::from_secs(get_config().jobs.drain_timeout_secs);
        let drain = async {
            let mut drained = 0usize;
            while let Some(job) = receiver.recv().await {
                runner.execute(job).await;
                drained += 1;
            }
            drained
        };
        match tokio::time::timeout(timeout, drain).await {
            Ok(n) => info!("Job worker drained {} queued jobs before shutdown", n),
            Err(_) => warn!(
                "Job worker drain timed out after {}s, remaining jobs stay pending",
                timeout.as_secs()
            ),
        }
    }
}

/// 启动时把 pending 的 webhook 事件和未提交的邮寄订单重新入队，返回入队数量
pub async fn requeue_pending_events(services: &AppServices) -> Result<usize> {
    let pending = webhook_events::pending_events(services.storage.get_db()).await?;
    let mut queued = 0;
    for event in pending {
        let job = if parse_rmm_source(&event.source).is_some() {
            Job::ProcessRmmEvent { event_id: event.id }
        } else if event.source == POSTGRID_SOURCE {
            Job::ProcessMailEvent { event_id: event.id }
        } else {
            warn!("Skipping pending event {} with unknown source {}", event.id, event.source);
            continue;
        };
        services.jobs.enqueue(job).await?;
        queued += 1;
    }
    if queued > 0 {
        info!("Re-enqueued {} pending webhook events", queued);
    }

    let orders = services.mail.unsubmitted_order_ids().await?;
    let order_count = orders.len();
    for order_id in orders {
        services.jobs.enqueue(Job::SubmitMailOrder { order_id }).await?;
    }
    if order_count > 0 {
        info!("Re-enqueued {} unsubmitted mail orders", order_count);
    }
    Ok(queued + order_count)
}
