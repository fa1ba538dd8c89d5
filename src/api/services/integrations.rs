//! RMM 集成、纸质邮件与报表端点

use actix_web::{HttpResponse, Result as ActixResult, web};
use serde_json::Value;

use crate::api::response::{api_created, api_message, api_result};
use crate::services::mail::{MailOrderFilter, MailOrderInput};
use crate::services::reports::QuarterQuery;
use crate::services::rmm::IntegrationInput;
use crate::services::{AppServices, TenantContext};
use crate::storage::PageRequest;

// ============ RMM integrations ============

pub async fn list_integrations(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.rmm.list(&ctx).await))
}

pub async fn create_integration(
    ctx: TenantContext,
    body: web::Json<IntegrationInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.rmm.create(&ctx, body.into_inner()).await))
}

pub async fn get_integration(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.rmm.get(&ctx, path.into_inner()).await))
}

pub async fn update_integration(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<IntegrationInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .rmm
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_integration(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.rmm.delete(&ctx, path.into_inner()).await,
        "Integration deleted",
    ))
}

/// POST /rmm/integrations/{id}/test：用样例 payload 预览字段检测结果
pub async fn test_integration(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.rmm.preview(&ctx, path.into_inner(), &body).await,
    ))
}

// ============ Physical mail ============

pub async fn list_mail_orders(
    ctx: TenantContext,
    filter: web::Query<MailOrderFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.mail.list(&ctx, &filter, &page).await))
}

pub async fn create_mail_order(
    ctx: TenantContext,
    body: web::Json<MailOrderInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.mail.create(&ctx, body.into_inner()).await))
}

pub async fn get_mail_order(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.mail.get(&ctx, path.into_inner()).await))
}

pub async fn cancel_mail_order(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.mail.cancel(&ctx, path.into_inner()).await))
}

/// POST /mail/orders/{id}/submit：入队失败后手动重新提交
pub async fn resubmit_mail_order(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.mail.resubmit(&ctx, path.into_inner()).await))
}

// ============ Reports ============

/// GET /reports/clients/{id}/qbr?year=&quarter=
pub async fn client_qbr(
    ctx: TenantContext,
    path: web::Path<i32>,
    query: web::Query<QuarterQuery>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .reports
            .qbr(&ctx, path.into_inner(), query.into_inner())
            .await,
    ))
}

/// GET /reports/dashboard
pub async fn dashboard(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.reports.dashboard(&ctx).await))
}
