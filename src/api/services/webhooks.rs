//! Webhook 接收端
//!
//! 请求体按原始字节读取（签名基于原始 body），大小受 `webhooks.max_body_bytes` 限制。

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use serde::Serialize;
use tracing::{debug, info};

use crate::api::response::{error_from_nestogy, json_response};
use crate::errors::Result;
use crate::services::AppServices;
use crate::services::rmm::WebhookCredentials;
use crate::services::webhook_events::WebhookReceipt;
use actix_web::http::StatusCode;

const RMM_SIGNATURE_HEADER: &str = "X-Webhook-Signature";
const RMM_API_KEY_HEADER: &str = "X-Api-Key";
const POSTGRID_SIGNATURE_HEADER: &str = "PostGrid-Signature";

#[derive(Debug, Serialize)]
struct ReceiptData {
    event_id: i32,
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// RMM 认证头：签名；API key 取 `X-Api-Key`，其次 `Authorization: Bearer`
fn rmm_credentials(req: &HttpRequest) -> WebhookCredentials {
    let bearer = header_value(req, "Authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()));
    WebhookCredentials {
        signature: header_value(req, RMM_SIGNATURE_HEADER),
        api_key: header_value(req, RMM_API_KEY_HEADER).or(bearer),
    }
}

fn receipt_response(result: Result<WebhookReceipt>) -> HttpResponse {
    match result {
        Ok(receipt) if receipt.duplicate => {
            debug!("Webhook: duplicate event {} ignored", receipt.event_id);
            json_response(
                StatusCode::OK,
                "Duplicate event ignored",
                Some(ReceiptData {
                    event_id: receipt.event_id,
                }),
            )
        }
        Ok(receipt) => json_response(
            StatusCode::OK,
            "Event accepted",
            Some(ReceiptData {
                event_id: receipt.event_id,
            }),
        ),
        Err(e) => error_from_nestogy(&e),
    }
}

/// POST /webhooks/rmm/{uuid}
pub async fn receive_rmm(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let uuid = path.into_inner();
    info!("Webhook: RMM delivery for integration {} ({} bytes)", uuid, body.len());
    let credentials = rmm_credentials(&req);
    Ok(receipt_response(
        services.rmm.receive(&uuid, &credentials, &body).await,
    ))
}

/// POST /webhooks/postgrid
pub async fn receive_postgrid(
    req: HttpRequest,
    body: web::Bytes,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    info!("Webhook: PostGrid delivery ({} bytes)", body.len());
    let signature = header_value(&req, POSTGRID_SIGNATURE_HEADER);
    Ok(receipt_response(
        services
            .mail
            .receive_webhook(signature.as_deref(), &body)
            .await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_api_key_falls_back_to_bearer() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer k-123"))
            .to_http_request();
        let creds = rmm_credentials(&req);
        assert_eq!(creds.api_key.as_deref(), Some("k-123"));
        assert!(creds.signature.is_none());

        let req = TestRequest::default()
            .insert_header(("X-Api-Key", "primary"))
            .insert_header(("Authorization", "Bearer secondary"))
            .insert_header(("X-Webhook-Signature", "sha256=abc"))
            .to_http_request();
        let creds = rmm_credentials(&req);
        assert_eq!(creds.api_key.as_deref(), Some("primary"));
        assert_eq!(creds.signature.as_deref(), Some("sha256=abc"));
    }
}
