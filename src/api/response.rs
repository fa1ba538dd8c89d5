//! 统一 JSON 响应信封
//!
//! 所有 API 响应都是 `{ success, message, data?, errors? }`。

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, error};
use serde::Serialize;
use tracing::{error, warn};

use crate::errors::{FieldErrors, NestogyError};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            success: status.is_success(),
            message: message.into(),
            data,
            errors: None,
        })
}

/// 200 OK + data
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, "OK", Some(data))
}

/// 201 Created + data
pub fn created_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::CREATED, "Created", Some(data))
}

/// 只有消息、没有数据的成功响应
pub fn message_response(message: impl Into<String>) -> HttpResponse {
    json_response::<()>(StatusCode::OK, message, None)
}

/// 构建错误响应
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response::<()>(status, message, None)
}

/// 从 NestogyError 构建错误响应（自动映射状态码，422 时附带字段错误）
pub fn error_from_nestogy(err: &NestogyError) -> HttpResponse {
    let status = err.http_status();
    if status.is_server_error() {
        error!("API error {}: {}", err.code(), err);
    }
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse::<()> {
            success: false,
            message: err.message().to_string(),
            data: None,
            errors: err.field_errors().cloned(),
        })
}

/// 统一 Result → HttpResponse 转换
///
/// 成功时返回 200 OK + JSON 数据，失败时自动映射 NestogyError。
pub fn api_result<T: Serialize>(result: Result<T, NestogyError>) -> HttpResponse {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_from_nestogy(&e),
    }
}

/// 成功时返回 201
pub fn api_created<T: Serialize>(result: Result<T, NestogyError>) -> HttpResponse {
    match result {
        Ok(data) => created_response(data),
        Err(e) => error_from_nestogy(&e),
    }
}

/// 成功时只返回消息
pub fn api_message(result: Result<(), NestogyError>, message: &str) -> HttpResponse {
    match result {
        Ok(()) => message_response(message),
        Err(e) => error_from_nestogy(&e),
    }
}

/// 可在提取器中返回的错误包装
#[derive(Debug)]
pub struct ApiError(pub NestogyError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.0.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        error_from_nestogy(&self.0)
    }
}

impl From<NestogyError> for ApiError {
    fn from(err: NestogyError) -> Self {
        ApiError(err)
    }
}

/// JSON 请求体解析失败 → 422
pub fn json_error_handler(err: error::JsonPayloadError, req: &HttpRequest) -> error::Error {
    warn!("Rejected JSON body on {}: {}", req.path(), err);
    let message = match &err {
        error::JsonPayloadError::OverflowKnownLength { .. } | error::JsonPayloadError::Overflow { .. } => {
            "Request body is too large".to_string()
        }
        error::JsonPayloadError::ContentType => "Content-Type must be application/json".to_string(),
        other => format!("Malformed JSON body: {}", other),
    };
    ApiError(NestogyError::validation(message)).into()
}

/// 查询参数解析失败 → 422
pub fn query_error_handler(err: error::QueryPayloadError, req: &HttpRequest) -> error::Error {
    warn!("Rejected query string on {}: {}", req.path(), err);
    ApiError(NestogyError::validation(format!("Invalid query parameters: {}", err))).into()
}

/// 路径参数解析失败 → 404（如 /clients/abc）
pub fn path_error_handler(err: error::PathError, req: &HttpRequest) -> error::Error {
    warn!("Rejected path on {}: {}", req.path(), err);
    ApiError(NestogyError::not_found("Resource not found")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(resp: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_rt::test]
    async fn test_success_envelope() {
        let resp = success_response(serde_json::json!({"id": 1}));
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
        assert!(body.get("errors").is_none());
    }

    #[actix_rt::test]
    async fn test_validation_envelope_carries_field_errors() {
        let err = NestogyError::invalid_field("name", "has already been taken");
        let resp = error_from_nestogy(&err);
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "The given data was invalid.");
        assert_eq!(body["errors"]["name"][0], "has already been taken");
        assert!(body.get("data").is_none());
    }

    #[actix_rt::test]
    async fn test_message_response_has_no_data() {
        let body = body_json(message_response("Deleted")).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Deleted");
        assert!(body.get("data").is_none());
    }
}
