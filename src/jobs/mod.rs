//! 进程内后台任务队列
//!
//! 有界 mpsc 通道 + 单个 worker 顺序执行；失败按指数退避重试，
//! 最后一次仍失败时写入 `failed_jobs`。

mod worker;

pub use worker::{JobRunner, JobWorker, requeue_pending_events};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{NestogyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    ProcessRmmEvent { event_id: i32 },
    ProcessMailEvent { event_id: i32 },
    SubmitMailOrder { order_id: i32 },
    SendSms { company_id: i32, to: String, body: String },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::ProcessRmmEvent { .. } => "process_rmm_event",
            Job::ProcessMailEvent { .. } => "process_mail_event",
            Job::SubmitMailOrder { .. } => "submit_mail_order",
            Job::SendSms { .. } => "send_sms",
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"job\":\"{}\"}}", self.name()))
    }
}

pub type JobReceiver = mpsc::Receiver<Job>;

/// 任务发送端，可随意 clone
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// 非阻塞入队；队列已满或 worker 已停止时返回 QueueFull
    pub fn try_enqueue(&self, job: Job) -> Result<()> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("JobQueue: queue is full, rejected {}", job.name());
                Err(NestogyError::queue_full("Job queue is full, try again later"))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("JobQueue: worker stopped, rejected {}", job.name());
                Err(NestogyError::queue_full("Job worker is not running"))
            }
        }
    }

    /// 入队，队列满时等待空位（启动时回填待处理事件用）
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        debug!("JobQueue: enqueue {}", job.to_json());
        self.sender
            .send(job)
            .await
            .map_err(|_| NestogyError::queue_full("Job worker is not running"))
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}
