//! 工单与知识库端点

use actix_web::{HttpResponse, Result as ActixResult, web};

use crate::api::response::{api_created, api_message, api_result};
use crate::services::kb::{ArticleFilter, ArticleInput};
use crate::services::tickets::{TicketFilter, TicketInput};
use crate::services::{AppServices, TenantContext};
use crate::storage::PageRequest;

pub async fn list_tickets(
    ctx: TenantContext,
    filter: web::Query<TicketFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.tickets.list(&ctx, &filter, &page).await))
}

pub async fn create_ticket(
    ctx: TenantContext,
    body: web::Json<TicketInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.tickets.create(&ctx, body.into_inner()).await))
}

pub async fn get_ticket(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.tickets.get(&ctx, path.into_inner()).await))
}

pub async fn update_ticket(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<TicketInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .tickets
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_ticket(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.tickets.delete(&ctx, path.into_inner()).await,
        "Ticket deleted",
    ))
}

// ============ Knowledge base ============

pub async fn list_articles(
    ctx: TenantContext,
    filter: web::Query<ArticleFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.kb.list(&ctx, &filter, &page).await))
}

pub async fn create_article(
    ctx: TenantContext,
    body: web::Json<ArticleInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.kb.create(&ctx, body.into_inner()).await))
}

/// 读取即计数（view_count + 1）
pub async fn get_article(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.kb.get(&ctx, path.into_inner()).await))
}

pub async fn update_article(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<ArticleInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .kb
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_article(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.kb.delete(&ctx, path.into_inner()).await,
        "Article deleted",
    ))
}
