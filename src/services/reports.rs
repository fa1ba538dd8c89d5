//! Reporting: quarterly business reviews and the tenant dashboard

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::errors::{NestogyError, Result};
use crate::models::{
    ContractStatus, InvoiceStatus, SupportStatus, TicketStatus, WebhookEventStatus,
};
use crate::services::TenantContext;
use crate::services::tickets::is_open_status;
use crate::storage::{SeaOrmStorage, TenantScoped, find_scoped};
use migration::entities::{asset, client, contract, invoice, ticket, time_entry, webhook_event};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuarterQuery {
    pub year: Option<i32>,
    pub quarter: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarterPeriod {
    pub year: i32,
    pub quarter: u32,
    pub start: NaiveDate,
    /// 含当天
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractSummary {
    pub id: i32,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub monthly_value_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QbrReport {
    pub client_id: i32,
    pub client_name: String,
    pub period: QuarterPeriod,
    pub tickets_opened: u64,
    pub tickets_resolved: u64,
    pub open_tickets: u64,
    pub billable_minutes: i64,
    pub non_billable_minutes: i64,
    pub invoiced_cents: i64,
    pub paid_cents: i64,
    pub assets_by_support_status: BTreeMap<String, u64>,
    pub active_contracts: Vec<ContractSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub clients: u64,
    pub open_tickets: u64,
    pub unsupported_assets: u64,
    pub draft_invoices: u64,
    pub pending_webhook_events: u64,
}

/// 季度起止：[start, next_start)
pub fn quarter_bounds(year: i32, quarter: u32) -> Result<(NaiveDate, NaiveDate)> {
    if !(1..=4).contains(&quarter) {
        return Err(NestogyError::invalid_field("quarter", "must be between 1 and 4"));
    }
    if !(2000..=2100).contains(&year) {
        return Err(NestogyError::invalid_field("year", "must be between 2000 and 2100"));
    }
    let start_month = (quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, start_month, 1)
        .ok_or_else(|| NestogyError::invalid_field("year", "is not a valid year"))?;
    let next = if quarter == 4 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, start_month + 3, 1)
    }
    .ok_or_else(|| NestogyError::invalid_field("year", "is not a valid year"))?;
    Ok((start, next))
}

/// 日期所在季度
pub fn quarter_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), (date.month() - 1) / 3 + 1)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn open_statuses() -> Vec<String> {
    TicketStatus::iter()
        .filter(|s| is_open_status(*s))
        .map(|s| s.to_string())
        .collect()
}

pub struct ReportService {
    storage: Arc<SeaOrmStorage>,
}

impl ReportService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 客户季度业务回顾；缺省为当前季度
    pub async fn qbr(&self, ctx: &TenantContext, client_id: i32, query: QuarterQuery) -> Result<QbrReport> {
        let db = self.storage.get_db();
        let found = find_scoped::<client::Entity, _>(db, ctx.company_id, client_id).await?;

        let (current_year, current_quarter) = quarter_of(Utc::now().date_naive());
        let year = query.year.unwrap_or(current_year);
        let quarter = query.quarter.unwrap_or(current_quarter);
        let (start, next) = quarter_bounds(year, quarter)?;
        let (from, until) = (midnight(start), midnight(next));

        let tickets = || {
            ticket::Entity::find_in_tenant(ctx.company_id).filter(ticket::Column::ClientId.eq(client_id))
        };
        let tickets_opened = tickets()
            .filter(ticket::Column::CreatedAt.gte(from))
            .filter(ticket::Column::CreatedAt.lt(until))
            .count(db)
            .await?;
        let tickets_resolved = tickets()
            .filter(ticket::Column::ResolvedAt.gte(from))
            .filter(ticket::Column::ResolvedAt.lt(until))
            .count(db)
            .await?;
        let open_tickets = tickets()
            .filter(ticket::Column::Status.is_in(open_statuses()))
            .count(db)
            .await?;

        let logged: Vec<(i32, bool)> = time_entry::Entity::find_in_tenant(ctx.company_id)
            .select_only()
            .column(time_entry::Column::Minutes)
            .column(time_entry::Column::Billable)
            .filter(time_entry::Column::ClientId.eq(client_id))
            .filter(time_entry::Column::WorkDate.gte(start))
            .filter(time_entry::Column::WorkDate.lt(next))
            .into_tuple()
            .all(db)
            .await?;
        let (billable_minutes, non_billable_minutes) =
            logged.iter().fold((0i64, 0i64), |(b, n), (minutes, billable)| {
                if *billable {
                    (b + i64::from(*minutes), n)
                } else {
                    (b, n + i64::from(*minutes))
                }
            });

        let invoiced: Vec<i64> = invoice::Entity::find_in_tenant(ctx.company_id)
            .select_only()
            .column(invoice::Column::TotalCents)
            .filter(invoice::Column::ClientId.eq(client_id))
            .filter(invoice::Column::Status.is_in([
                InvoiceStatus::Sent.to_string(),
                InvoiceStatus::Paid.to_string(),
            ]))
            .filter(invoice::Column::IssueDate.gte(start))
            .filter(invoice::Column::IssueDate.lt(next))
            .into_tuple()
            .all(db)
            .await?;
        let paid: Vec<i64> = invoice::Entity::find_in_tenant(ctx.company_id)
            .select_only()
            .column(invoice::Column::TotalCents)
            .filter(invoice::Column::ClientId.eq(client_id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Paid.as_ref()))
            .filter(invoice::Column::PaidAt.gte(from))
            .filter(invoice::Column::PaidAt.lt(until))
            .into_tuple()
            .all(db)
            .await?;

        let support: Vec<String> = asset::Entity::find_in_tenant(ctx.company_id)
            .select_only()
            .column(asset::Column::SupportStatus)
            .filter(asset::Column::ClientId.eq(client_id))
            .into_tuple()
            .all(db)
            .await?;
        let mut assets_by_support_status: BTreeMap<String, u64> =
            SupportStatus::iter().map(|s| (s.to_string(), 0)).collect();
        for status in support {
            *assets_by_support_status.entry(status).or_default() += 1;
        }

        let active_contracts = contract::Entity::find_in_tenant(ctx.company_id)
            .filter(contract::Column::ClientId.eq(client_id))
            .filter(contract::Column::Status.eq(ContractStatus::Active.as_ref()))
            .all(db)
            .await?
            .into_iter()
            .map(|c| ContractSummary {
                id: c.id,
                name: c.name,
                start_date: c.start_date,
                end_date: c.end_date,
                monthly_value_cents: c.monthly_value_cents,
            })
            .collect();

        Ok(QbrReport {
            client_id,
            client_name: found.name,
            period: QuarterPeriod {
                year,
                quarter,
                start,
                end: next.pred_opt().unwrap_or(next),
            },
            tickets_opened,
            tickets_resolved,
            open_tickets,
            billable_minutes,
            non_billable_minutes,
            invoiced_cents: invoiced.iter().sum(),
            paid_cents: paid.iter().sum(),
            assets_by_support_status,
            active_contracts,
        })
    }

    pub async fn dashboard(&self, ctx: &TenantContext) -> Result<Dashboard> {
        let db = self.storage.get_db();
        let company_id = ctx.company_id;

        let clients = client::Entity::find_in_tenant(company_id).count(db).await?;
        let open_tickets = ticket::Entity::find_in_tenant(company_id)
            .filter(ticket::Column::Status.is_in(open_statuses()))
            .count(db)
            .await?;
        let unsupported_assets = asset::Entity::find_in_tenant(company_id)
            .filter(asset::Column::SupportStatus.eq(SupportStatus::Unsupported.as_ref()))
            .count(db)
            .await?;
        let draft_invoices = invoice::Entity::find_in_tenant(company_id)
            .filter(invoice::Column::Status.eq(InvoiceStatus::Draft.as_ref()))
            .count(db)
            .await?;
        let pending_webhook_events = webhook_event::Entity::find()
            .filter(webhook_event::Column::CompanyId.eq(company_id))
            .filter(webhook_event::Column::Status.eq(WebhookEventStatus::Pending.as_ref()))
            .count(db)
            .await?;

        Ok(Dashboard {
            clients,
            open_tickets,
            unsupported_assets,
            draft_invoices,
            pending_webhook_events,
        })
    }
}
