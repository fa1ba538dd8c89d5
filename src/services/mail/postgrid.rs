//! PostGrid 打印邮寄 API 客户端
//!
//! ureq 是同步客户端，调用都放在 spawn_blocking 中执行。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ureq::Agent;

use crate::config::PostGridConfig;
use crate::errors::{NestogyError, Result};

/// 收件地址（PostGrid 字段命名）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGridAddress {
    pub first_name: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province_or_state: Option<String>,
    pub postal_or_zip: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LetterRequest {
    pub to: PostGridAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub html: String,
    pub metadata: LetterMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct LetterMetadata {
    pub order_id: i32,
    pub company_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LetterResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct PostGridClient {
    agent: Agent,
    api_url: String,
    api_key: String,
}

impl PostGridClient {
    /// 未配置 api_key 时返回 None
    pub fn from_config(config: &PostGridConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .build()
            .into();
        Some(Self {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn create_letter_sync(&self, request: &LetterRequest) -> Result<LetterResponse> {
        let url = format!("{}/letters", self.api_url);
        let resp = self
            .agent
            .post(&url)
            .header("x-api-key", &self.api_key)
            .send_json(request)
            .map_err(|e| NestogyError::integration(format!("PostGrid request failed: {}", e)))?;
        let letter: LetterResponse = resp
            .into_body()
            .read_json()
            .map_err(|e| NestogyError::integration(format!("PostGrid response parse failed: {}", e)))?;
        debug!("PostGrid letter {} created", letter.id);
        Ok(letter)
    }

    fn cancel_letter_sync(&self, provider_id: &str) -> Result<()> {
        let url = format!("{}/letters/{}", self.api_url, provider_id);
        self.agent
            .delete(&url)
            .header("x-api-key", &self.api_key)
            .call()
            .map_err(|e| NestogyError::integration(format!("PostGrid cancel failed: {}", e)))?;
        Ok(())
    }

    pub async fn create_letter(&self, request: LetterRequest) -> Result<LetterResponse> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.create_letter_sync(&request))
            .await
            .unwrap_or_else(|e| {
                warn!("PostGrid spawn_blocking failed: {}", e);
                Err(NestogyError::internal("PostGrid worker thread failed"))
            })
    }

    pub async fn cancel_letter(&self, provider_id: &str) -> Result<()> {
        let client = self.clone();
        let provider_id = provider_id.to_string();
        tokio::task::spawn_blocking(move || client.cancel_letter_sync(&provider_id))
            .await
            .unwrap_or_else(|e| {
                warn!("PostGrid spawn_blocking failed: {}", e);
                Err(NestogyError::internal("PostGrid worker thread failed"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let mut config = PostGridConfig {
            api_url: "https://api.postgrid.com/print-mail/v1/".into(),
            api_key: None,
            webhook_secret: None,
            timeout_secs: 5,
        };
        assert!(PostGridClient::from_config(&config).is_none());
        config.api_key = Some("  ".into());
        assert!(PostGridClient::from_config(&config).is_none());
        config.api_key = Some("test_sk_123".into());
        let client = PostGridClient::from_config(&config).unwrap();
        assert_eq!(client.api_url, "https://api.postgrid.com/print-mail/v1");
    }

    #[test]
    fn test_address_uses_postgrid_names() {
        let address = PostGridAddress {
            first_name: "Acme".into(),
            address_line1: "1 Main St".into(),
            address_line2: None,
            city: "Springfield".into(),
            province_or_state: Some("IL".into()),
            postal_or_zip: "62701".into(),
            country_code: "US".into(),
        };
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["addressLine1"], "1 Main St");
        assert_eq!(json["postalOrZip"], "62701");
        assert!(json.get("addressLine2").is_none());
    }
}
