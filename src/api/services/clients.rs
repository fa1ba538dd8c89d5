//! 客户与联系人端点

use actix_multipart::Multipart;
use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::{info, trace};

use super::upload::{csv_attachment, read_import_form};
use crate::api::response::{api_created, api_message, api_result, error_from_nestogy};
use crate::services::clients::{ClientFilter, ClientInput, ContactInput};
use crate::services::{AppServices, TenantContext};
use crate::storage::PageRequest;

/// GET /clients
pub async fn list_clients(
    ctx: TenantContext,
    filter: web::Query<ClientFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    trace!("API: list clients with filter {:?}", filter);
    Ok(api_result(services.clients.list(&ctx, &filter, &page).await))
}

/// POST /clients
pub async fn create_client(
    ctx: TenantContext,
    body: web::Json<ClientInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.clients.create(&ctx, body.into_inner()).await))
}

/// GET /clients/{id}
pub async fn get_client(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.clients.get(&ctx, path.into_inner()).await))
}

/// PUT /clients/{id}
pub async fn update_client(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<ClientInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .clients
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

/// DELETE /clients/{id}
pub async fn delete_client(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.clients.delete(&ctx, path.into_inner()).await,
        "Client deleted",
    ))
}

/// POST /clients/import（multipart: file, mode）
pub async fn import_clients(
    ctx: TenantContext,
    payload: Multipart,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let form = match read_import_form(payload).await {
        Ok(form) => form,
        Err(e) => return Ok(error_from_nestogy(&e)),
    };
    let result = services.clients.import_csv(&ctx, &form.data, form.mode).await;
    if let Ok(report) = &result {
        info!(
            "API: client import finished - {} imported, {} skipped, {} failed",
            report.success, report.skipped, report.failed
        );
    }
    Ok(api_result(result))
}

/// GET /clients/export
pub async fn export_clients(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    match services.clients.export_csv(&ctx).await {
        Ok(csv) => Ok(csv_attachment("clients", csv)),
        Err(e) => Ok(error_from_nestogy(&e)),
    }
}

// ============ Contacts ============

/// GET /clients/{id}/contacts
pub async fn list_contacts(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.clients.list_contacts(&ctx, path.into_inner()).await,
    ))
}

/// POST /clients/{id}/contacts
pub async fn create_contact(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<ContactInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services
            .clients
            .create_contact(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

/// PUT /clients/{id}/contacts/{contact_id}
pub async fn update_contact(
    ctx: TenantContext,
    path: web::Path<(i32, i32)>,
    body: web::Json<ContactInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let (client_id, contact_id) = path.into_inner();
    Ok(api_result(
        services
            .clients
            .update_contact(&ctx, client_id, contact_id, body.into_inner())
            .await,
    ))
}

/// DELETE /clients/{id}/contacts/{contact_id}
pub async fn delete_contact(
    ctx: TenantContext,
    path: web::Path<(i32, i32)>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let (client_id, contact_id) = path.into_inner();
    Ok(api_message(
        services
            .clients
            .delete_contact(&ctx, client_id, contact_id)
            .await,
        "Contact deleted",
    ))
}
