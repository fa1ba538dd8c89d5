//! 资产与合同端点

use actix_multipart::Multipart;
use actix_web::{HttpResponse, Result as ActixResult, web};

use super::upload::{csv_attachment, read_import_form};
use crate::api::response::{api_created, api_message, api_result, error_from_nestogy};
use crate::services::assets::{AssetFilter, AssetInput};
use crate::services::contracts::{ContractFilter, ContractInput};
use crate::services::{AppServices, TenantContext};
use crate::storage::PageRequest;

/// GET /assets
pub async fn list_assets(
    ctx: TenantContext,
    filter: web::Query<AssetFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.assets.list(&ctx, &filter, &page).await))
}

/// POST /assets
pub async fn create_asset(
    ctx: TenantContext,
    body: web::Json<AssetInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(services.assets.create(&ctx, body.into_inner()).await))
}

/// GET /assets/{id}
pub async fn get_asset(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.assets.get(&ctx, path.into_inner()).await))
}

/// PUT /assets/{id}
pub async fn update_asset(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<AssetInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .assets
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

/// DELETE /assets/{id}
pub async fn delete_asset(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.assets.delete(&ctx, path.into_inner()).await,
        "Asset deleted",
    ))
}

/// POST /assets/import
pub async fn import_assets(
    ctx: TenantContext,
    payload: Multipart,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let form = match read_import_form(payload).await {
        Ok(form) => form,
        Err(e) => return Ok(error_from_nestogy(&e)),
    };
    Ok(api_result(
        services.assets.import_csv(&ctx, &form.data, form.mode).await,
    ))
}

/// GET /assets/export
pub async fn export_assets(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    match services.assets.export_csv(&ctx).await {
        Ok(csv) => Ok(csv_attachment("assets", csv)),
        Err(e) => Ok(error_from_nestogy(&e)),
    }
}

// ============ Contracts ============

/// GET /contracts
pub async fn list_contracts(
    ctx: TenantContext,
    filter: web::Query<ContractFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.contracts.list(&ctx, &filter, &page).await))
}

/// POST /contracts
pub async fn create_contract(
    ctx: TenantContext,
    body: web::Json<ContractInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.contracts.create(&ctx, body.into_inner()).await,
    ))
}

/// GET /contracts/{id}
pub async fn get_contract(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.contracts.get(&ctx, path.into_inner()).await))
}

/// PUT /contracts/{id}
pub async fn update_contract(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<ContractInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .contracts
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

/// DELETE /contracts/{id}
pub async fn delete_contract(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.contracts.delete(&ctx, path.into_inner()).await,
        "Contract deleted",
    ))
}

/// GET /contracts/{id}/assets
pub async fn list_contract_assets(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.contracts.list_assets(&ctx, path.into_inner()).await,
    ))
}

/// POST /contracts/{id}/assets/{asset_id}
pub async fn attach_contract_asset(
    ctx: TenantContext,
    path: web::Path<(i32, i32)>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let (contract_id, asset_id) = path.into_inner();
    Ok(api_message(
        services
            .contracts
            .attach_asset(&ctx, contract_id, asset_id)
            .await,
        "Asset attached",
    ))
}

/// DELETE /contracts/{id}/assets/{asset_id}
pub async fn detach_contract_asset(
    ctx: TenantContext,
    path: web::Path<(i32, i32)>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let (contract_id, asset_id) = path.into_inner();
    Ok(api_message(
        services
            .contracts
            .detach_asset(&ctx, contract_id, asset_id)
            .await,
        "Asset detached",
    ))
}
