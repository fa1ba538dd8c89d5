//! 工时、薪资、费率卡与发票端点

use actix_web::{HttpResponse, Result as ActixResult, web};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::upload::csv_attachment;
use crate::api::response::{api_created, api_message, api_result, error_from_nestogy};
use crate::services::invoices::{AccountingExportQuery, GenerateFromTimeRequest, InvoiceFilter, InvoiceInput};
use crate::services::rate_cards::RateCardInput;
use crate::services::time_entries::{ReviewRequest, TimeEntryFilter, TimeEntryInput};
use crate::services::timeclock::{ClockEntryUpdate, ClockFilter, ClockInput};
use crate::services::{AppServices, TenantContext};
use crate::storage::PageRequest;

// ============ Time clock ============

pub async fn list_clock_entries(
    ctx: TenantContext,
    filter: web::Query<ClockFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.timeclock.list(&ctx, &filter, &page).await))
}

pub async fn get_clock_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.timeclock.get(&ctx, path.into_inner()).await))
}

/// POST /timeclock/clock-in（请求体可省略）
pub async fn clock_in(
    ctx: TenantContext,
    body: Option<web::Json<ClockInput>>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let input = body.map(|b| b.into_inner()).unwrap_or_default();
    Ok(api_created(services.timeclock.clock_in(&ctx, input).await))
}

/// POST /timeclock/clock-out
pub async fn clock_out(
    ctx: TenantContext,
    body: Option<web::Json<ClockInput>>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let input = body.map(|b| b.into_inner()).unwrap_or_default();
    Ok(api_result(services.timeclock.clock_out(&ctx, input).await))
}

pub async fn update_clock_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<ClockEntryUpdate>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .timeclock
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn approve_clock_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.timeclock.approve(&ctx, path.into_inner()).await))
}

pub async fn reject_clock_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.timeclock.reject(&ctx, path.into_inner()).await))
}

#[derive(Debug, Deserialize)]
pub struct PayrollExportRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportFormat {
    /// `csv` 返回附件，其余返回 JSON
    pub format: Option<String>,
}

/// POST /payroll/export
pub async fn export_payroll(
    ctx: TenantContext,
    body: web::Json<PayrollExportRequest>,
    format: web::Query<ExportFormat>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let export = match services
        .timeclock
        .export_payroll(&ctx, body.from, body.to)
        .await
    {
        Ok(export) => export,
        Err(e) => return Ok(error_from_nestogy(&e)),
    };
    info!(
        "API: payroll export {}..{} marked {} entries",
        export.from, export.to, export.entry_count
    );

    let wants_csv = format
        .format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("csv"));
    if wants_csv {
        Ok(csv_attachment("payroll", export.csv))
    } else {
        Ok(api_result(Ok(export)))
    }
}

// ============ Billable time ============

pub async fn list_time_entries(
    ctx: TenantContext,
    filter: web::Query<TimeEntryFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.time_entries.list(&ctx, &filter, &page).await,
    ))
}

pub async fn create_time_entry(
    ctx: TenantContext,
    body: web::Json<TimeEntryInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.time_entries.create(&ctx, body.into_inner()).await,
    ))
}

pub async fn get_time_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.time_entries.get(&ctx, path.into_inner()).await,
    ))
}

pub async fn update_time_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<TimeEntryInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .time_entries
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_time_entry(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.time_entries.delete(&ctx, path.into_inner()).await,
        "Time entry deleted",
    ))
}

/// POST /time-entries/approve {ids}
pub async fn approve_time_entries(
    ctx: TenantContext,
    body: web::Json<ReviewRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.time_entries.approve(&ctx, &body.ids).await,
    ))
}

/// POST /time-entries/reject {ids}
pub async fn reject_time_entries(
    ctx: TenantContext,
    body: web::Json<ReviewRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.time_entries.reject(&ctx, &body.ids).await,
    ))
}

// ============ Rate cards ============

#[derive(Debug, Default, Deserialize)]
pub struct RateCardQuery {
    pub client_id: Option<i32>,
}

pub async fn list_rate_cards(
    ctx: TenantContext,
    query: web::Query<RateCardQuery>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services.rate_cards.list(&ctx, query.client_id).await,
    ))
}

pub async fn create_rate_card(
    ctx: TenantContext,
    body: web::Json<RateCardInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.rate_cards.create(&ctx, body.into_inner()).await,
    ))
}

pub async fn get_rate_card(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.rate_cards.get(&ctx, path.into_inner()).await))
}

pub async fn update_rate_card(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<RateCardInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .rate_cards
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_rate_card(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.rate_cards.delete(&ctx, path.into_inner()).await,
        "Rate card deleted",
    ))
}

// ============ Invoices ============

pub async fn list_invoices(
    ctx: TenantContext,
    filter: web::Query<InvoiceFilter>,
    page: web::Query<PageRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.invoices.list(&ctx, &filter, &page).await))
}

pub async fn create_invoice(
    ctx: TenantContext,
    body: web::Json<InvoiceInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.invoices.create(&ctx, body.into_inner()).await,
    ))
}

pub async fn get_invoice(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(services.invoices.get(&ctx, path.into_inner()).await))
}

pub async fn update_invoice(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<InvoiceInput>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .invoices
            .update(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn delete_invoice(
    ctx: TenantContext,
    path: web::Path<i32>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_message(
        services.invoices.delete(&ctx, path.into_inner()).await,
        "Invoice deleted",
    ))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

/// POST /invoices/{id}/transition {status}
pub async fn transition_invoice(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<TransitionRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .invoices
            .transition(&ctx, path.into_inner(), &body.status)
            .await,
    ))
}

/// POST /invoices/generate-from-time
pub async fn generate_invoices(
    ctx: TenantContext,
    body: web::Json<GenerateFromTimeRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    let result = services
        .invoices
        .generate_from_time(&ctx, body.into_inner())
        .await;
    if let Ok(generated) = &result {
        info!("API: generated {} invoices from time", generated.len());
    }
    Ok(api_created(result))
}

/// GET /invoices/export?from=&to=：会计系统导入用的发票明细 CSV
pub async fn export_invoices(
    ctx: TenantContext,
    query: web::Query<AccountingExportQuery>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    match services.invoices.export_accounting(&ctx, &query).await {
        Ok(csv) => Ok(csv_attachment("invoices", csv)),
        Err(e) => Ok(error_from_nestogy(&e)),
    }
}
