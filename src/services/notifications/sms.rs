//! 短信服务商：Twilio 与 Nexmo（Vonage）
//!
//! 两者都是表单 POST 的 REST 接口，ureq 调用放在 spawn_blocking 中执行。

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, warn};
use ureq::Agent;

use super::{DeliveryReceipt, NotificationChannel, SmsMessage};
use crate::config::{SmsConfig, SmsProvider};
use crate::errors::{NestogyError, Result};

const TWILIO_API_URL: &str = "https://api.twilio.com";
const NEXMO_API_URL: &str = "https://rest.nexmo.com";

fn build_agent(timeout_secs: u64) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(timeout_secs.max(1))))
        .build()
        .into()
}

fn required(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// 按配置构造短信渠道；provider 未设置或凭据不全时返回 None
pub fn channel_from_config(config: &SmsConfig) -> Option<Arc<dyn NotificationChannel>> {
    let provider = config.provider?;
    let channel: Option<Arc<dyn NotificationChannel>> = match provider {
        SmsProvider::Twilio => TwilioSmsChannel::from_config(config).map(|c| Arc::new(c) as _),
        SmsProvider::Nexmo => NexmoSmsChannel::from_config(config).map(|c| Arc::new(c) as _),
    };
    if channel.is_none() {
        warn!(
            "SMS provider {} is selected but account_id, auth_token or from_number is missing",
            provider.as_ref()
        );
    }
    channel
}

async fn run_blocking<T, F>(provider: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or_else(|e| {
        warn!("{} spawn_blocking failed: {}", provider, e);
        Err(NestogyError::internal(format!("{} worker thread failed", provider)))
    })
}

// ============ Twilio ============

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Clone)]
pub struct TwilioSmsChannel {
    agent: Agent,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSmsChannel {
    pub fn from_config(config: &SmsConfig) -> Option<Self> {
        Some(Self {
            agent: build_agent(config.timeout_secs),
            api_url: config
                .api_url
                .as_deref()
                .unwrap_or(TWILIO_API_URL)
                .trim_end_matches('/')
                .to_string(),
            account_sid: required(&config.account_id)?,
            auth_token: required(&config.auth_token)?,
            from: required(&config.from_number)?,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_url, self.account_sid)
    }

    fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.account_sid, self.auth_token);
        format!("Basic {}", STANDARD.encode(raw))
    }

    fn send_sync(&self, message: &SmsMessage) -> Result<DeliveryReceipt> {
        let resp = self
            .agent
            .post(&self.messages_url())
            .header("Authorization", &self.basic_auth())
            .send_form([
                ("To", message.to.as_str()),
                ("From", self.from.as_str()),
                ("Body", message.body.as_str()),
            ])
            .map_err(|e| NestogyError::integration(format!("Twilio request failed: {}", e)))?;
        let sent: TwilioMessage = resp
            .into_body()
            .read_json()
            .map_err(|e| NestogyError::integration(format!("Twilio response parse failed: {}", e)))?;
        debug!("Twilio message {} accepted", sent.sid);
        Ok(DeliveryReceipt {
            channel: "twilio",
            provider_id: sent.sid,
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for TwilioSmsChannel {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt> {
        let channel = self.clone();
        let message = message.clone();
        run_blocking("Twilio", move || channel.send_sync(&message)).await
    }
}

// ============ Nexmo / Vonage ============

#[derive(Debug, Deserialize)]
struct NexmoResponse {
    #[serde(default)]
    messages: Vec<NexmoMessageStatus>,
}

#[derive(Debug, Deserialize)]
struct NexmoMessageStatus {
    status: String,
    #[serde(default, rename = "message-id")]
    message_id: Option<String>,
    #[serde(default, rename = "error-text")]
    error_text: Option<String>,
}

/// Nexmo 即使发送失败也返回 200，需要检查每段的 status（"0" 表示成功）
fn nexmo_receipt(resp: NexmoResponse) -> Result<DeliveryReceipt> {
    let first = resp
        .messages
        .first()
        .ok_or_else(|| NestogyError::integration("Nexmo response contained no messages"))?;
    if let Some(failed) = resp.messages.iter().find(|m| m.status != "0") {
        return Err(NestogyError::integration(format!(
            "Nexmo rejected the message (status {}): {}",
            failed.status,
            failed.error_text.as_deref().unwrap_or("unknown error")
        )));
    }
    Ok(DeliveryReceipt {
        channel: "nexmo",
        provider_id: first.message_id.clone().unwrap_or_default(),
    })
}

#[derive(Clone)]
pub struct NexmoSmsChannel {
    agent: Agent,
    api_url: String,
    api_key: String,
    api_secret: String,
    from: String,
}

impl NexmoSmsChannel {
    pub fn from_config(config: &SmsConfig) -> Option<Self> {
        Some(Self {
            agent: build_agent(config.timeout_secs),
            api_url: config
                .api_url
                .as_deref()
                .unwrap_or(NEXMO_API_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: required(&config.account_id)?,
            api_secret: required(&config.auth_token)?,
            from: required(&config.from_number)?,
        })
    }

    fn send_sync(&self, message: &SmsMessage) -> Result<DeliveryReceipt> {
        // Nexmo 的号码不带 +
        let to = message.to.trim_start_matches('+');
        let from = self.from.trim_start_matches('+');
        let resp = self
            .agent
            .post(&format!("{}/sms/json", self.api_url))
            .send_form([
                ("api_key", self.api_key.as_str()),
                ("api_secret", self.api_secret.as_str()),
                ("to", to),
                ("from", from),
                ("text", message.body.as_str()),
            ])
            .map_err(|e| NestogyError::integration(format!("Nexmo request failed: {}", e)))?;
        let parsed: NexmoResponse = resp
            .into_body()
            .read_json()
            .map_err(|e| NestogyError::integration(format!("Nexmo response parse failed: {}", e)))?;
        nexmo_receipt(parsed)
    }
}

#[async_trait::async_trait]
impl NotificationChannel for NexmoSmsChannel {
    fn name(&self) -> &'static str {
        "nexmo"
    }

    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt> {
        let channel = self.clone();
        let message = message.clone();
        run_blocking("Nexmo", move || channel.send_sync(&message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twilio_config() -> SmsConfig {
        SmsConfig {
            provider: Some(SmsProvider::Twilio),
            account_id: Some("AC123".into()),
            auth_token: Some("secret".into()),
            from_number: Some("+15550001111".into()),
            api_url: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_channel_requires_credentials() {
        assert!(channel_from_config(&SmsConfig::default()).is_none());

        let mut config = twilio_config();
        assert_eq!(channel_from_config(&config).unwrap().name(), "twilio");
        config.auth_token = Some(" ".into());
        assert!(channel_from_config(&config).is_none());

        let mut config = twilio_config();
        config.provider = Some(SmsProvider::Nexmo);
        assert_eq!(channel_from_config(&config).unwrap().name(), "nexmo");
    }

    #[test]
    fn test_twilio_url_and_auth() {
        let channel = TwilioSmsChannel::from_config(&twilio_config()).unwrap();
        assert_eq!(
            channel.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        // base64("AC123:secret")
        assert_eq!(channel.basic_auth(), "Basic QUMxMjM6c2VjcmV0");
    }

    #[test]
    fn test_nexmo_status_checks_every_part() {
        let ok: NexmoResponse = serde_json::from_str(
            r#"{"message-count":"1","messages":[{"status":"0","message-id":"0A0000001"}]}"#,
        )
        .unwrap();
        assert_eq!(nexmo_receipt(ok).unwrap().provider_id, "0A0000001");

        let rejected: NexmoResponse = serde_json::from_str(
            r#"{"messages":[{"status":"0","message-id":"a"},{"status":"4","error-text":"Bad Credentials"}]}"#,
        )
        .unwrap();
        let err = nexmo_receipt(rejected).unwrap_err();
        assert!(err.to_string().contains("Bad Credentials"));

        let empty: NexmoResponse = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert!(nexmo_receipt(empty).is_err());
    }
}
