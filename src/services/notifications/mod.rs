//! 出站通知
//!
//! 通知渠道以 [`NotificationChannel`] 抽象，目前只有短信（Twilio / Nexmo）。
//! API 请求只做校验并入队 `SendSms`，真正的发送在 job worker 中完成。

mod sms;

pub use sms::{NexmoSmsChannel, TwilioSmsChannel, channel_from_config};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::jobs::{Job, JobQueue};
use crate::services::TenantContext;

/// 单条短信最多 10 段（每段 160 个 GSM 字符）
pub const MAX_SMS_CHARS: usize = 1_600;

/// 一条待发送的短信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// 服务商回执
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReceipt {
    pub channel: &'static str,
    pub provider_id: String,
}

/// 通知渠道
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsRequest {
    pub to: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedSms {
    pub to: String,
    pub characters: usize,
}

/// E.164：+ 开头，8 到 15 位数字
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let digits = compact.strip_prefix('+')?;
    let valid = (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    valid.then_some(compact)
}

pub struct NotificationService {
    channel: Option<Arc<dyn NotificationChannel>>,
    jobs: JobQueue,
}

impl NotificationService {
    pub fn new(channel: Option<Arc<dyn NotificationChannel>>, jobs: JobQueue) -> Self {
        Self { channel, jobs }
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }

    /// 校验并入队短信；队列已满返回 503
    pub async fn queue_sms(&self, ctx: &TenantContext, req: SmsRequest) -> Result<QueuedSms> {
        let mut errors = FieldErrorsBuilder::new();
        let to = match req.to.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => {
                errors.add("to", "is required");
                None
            }
            Some(raw) => {
                let normalized = normalize_phone(raw);
                if normalized.is_none() {
                    errors.add("to", "must be an E.164 phone number such as +15551234567");
                }
                normalized
            }
        };
        let body = req.message.map(|m| m.trim().to_string()).unwrap_or_default();
        let characters = body.chars().count();
        if body.is_empty() {
            errors.add("message", "is required");
        } else if characters > MAX_SMS_CHARS {
            errors.add(
                "message",
                format!("may not be greater than {} characters", MAX_SMS_CHARS),
            );
        }
        errors.finish()?;

        let to = to.unwrap_or_default();
        self.jobs.try_enqueue(Job::SendSms {
            company_id: ctx.company_id,
            to: to.clone(),
            body,
        })?;
        info!(
            "NotificationService: queued SMS to {} for company {}",
            mask_phone(&to),
            ctx.company_id
        );
        Ok(QueuedSms { to, characters })
    }

    /// SendSms 任务：未配置服务商时报配置错误，由 worker 记入 failed_jobs
    pub async fn deliver_sms(&self, company_id: i32, to: &str, body: &str) -> Result<DeliveryReceipt> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| NestogyError::misconfigured("No SMS provider is configured"))?;
        let receipt = channel
            .send(&SmsMessage {
                to: to.to_string(),
                body: body.to_string(),
            })
            .await?;
        info!(
            "NotificationService: SMS to {} for company {} sent via {} ({})",
            mask_phone(to),
            company_id,
            receipt.channel,
            receipt.provider_id
        );
        Ok(receipt)
    }
}

/// 日志中只保留号码末四位
fn mask_phone(phone: &str) -> String {
    let tail: String = phone
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use parking_lot::Mutex;

    struct RecordingChannel {
        sent: Mutex<Vec<SmsMessage>>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt> {
            self.sent.lock().push(message.clone());
            Ok(DeliveryReceipt {
                channel: self.name(),
                provider_id: format!("msg-{}", self.sent.lock().len()),
            })
        }
    }

    fn ctx() -> TenantContext {
        TenantContext::new(3, 5, Role::Technician)
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("+447700900123").as_deref(), Some("+447700900123"));
        assert!(normalize_phone("5551234567").is_none());
        assert!(normalize_phone("+1555").is_none());
        assert!(normalize_phone("+1555abc4567").is_none());
        assert!(normalize_phone("+0123456789").is_none());
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+15551234567"), "***4567");
        assert_eq!(mask_phone("12"), "***12");
    }

    #[tokio::test]
    async fn test_queue_sms_validates_and_enqueues() {
        let (jobs, mut rx) = JobQueue::new(4);
        let service = NotificationService::new(None, jobs);

        let err = service
            .queue_sms(
                &ctx(),
                SmsRequest {
                    to: Some("555-1234".into()),
                    message: Some(" ".into()),
                },
            )
            .await
            .unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("to"));
        assert!(fields.contains_key("message"));

        let queued = service
            .queue_sms(
                &ctx(),
                SmsRequest {
                    to: Some("+1 555 123 4567".into()),
                    message: Some("FS01 is offline".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(queued.to, "+15551234567");
        assert_eq!(
            rx.recv().await,
            Some(Job::SendSms {
                company_id: 3,
                to: "+15551234567".into(),
                body: "FS01 is offline".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_deliver_uses_channel_or_reports_misconfiguration() {
        let (jobs, _rx) = JobQueue::new(1);
        let unconfigured = NotificationService::new(None, jobs.clone());
        let err = unconfigured.deliver_sms(1, "+15551234567", "hi").await.unwrap_err();
        assert_eq!(err.http_status().as_u16(), 500);

        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
        });
        let service = NotificationService::new(Some(channel.clone()), jobs);
        let receipt = service.deliver_sms(1, "+15551234567", "hi").await.unwrap();
        assert_eq!(receipt.channel, "recording");
        assert_eq!(channel.sent.lock()[0].to, "+15551234567");
    }
}
