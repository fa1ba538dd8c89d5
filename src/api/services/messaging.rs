//! 短信通知与邮箱 OAuth2 关联端点

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Result as ActixResult, web};

use crate::api::response::{api_created, api_result, error_from_nestogy, json_response};
use crate::services::email_accounts::{LinkRequest, OAuthCallback};
use crate::services::notifications::SmsRequest;
use crate::services::{AppServices, TenantContext};

/// POST /notifications/sms：校验后入队，202
pub async fn send_sms(
    ctx: TenantContext,
    body: web::Json<SmsRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    match services.notifications.queue_sms(&ctx, body.into_inner()).await {
        Ok(queued) => Ok(json_response(StatusCode::ACCEPTED, "SMS queued", Some(queued))),
        Err(e) => Ok(error_from_nestogy(&e)),
    }
}

// ============ Email accounts ============

pub async fn list_email_accounts(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.email_accounts.list(&ctx).await))
}

/// POST /email-accounts：返回服务商授权地址
pub async fn link_email_account(
    ctx: TenantContext,
    body: web::Json<LinkRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.email_accounts.begin_link(&ctx, body.into_inner()).await,
    ))
}

pub async fn get_email_account(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.email_accounts.get(&ctx, path.into_inner()).await))
}

pub async fn refresh_email_account(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.email_accounts.refresh(&ctx, path.into_inner()).await,
    ))
}

pub async fn disconnect_email_account(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .email_accounts
            .disconnect(&ctx, path.into_inner())
            .await,
    ))
}

/// GET /oauth/{provider}/callback?code=&state=（无需登录，靠 state 定位账户）
pub async fn oauth_callback(
    path: web::Path<String>,
    query: web::Query<OAuthCallback>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .email_accounts
            .complete_link(&path.into_inner(), query.into_inner())
            .await,
    ))
}
