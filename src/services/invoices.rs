//! Invoicing: manual invoices, totals, status flow and generation from approved time

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::get_config;
use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{InvoiceStatus, TimeEntryStatus, parse_field};
use crate::services::TenantContext;
use crate::services::rate_cards::resolve_rate;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::csv_handler::write_rows;
use migration::entities::{client, company, invoice, invoice_item, time_entry};

/// 单价、费率与金额的上限（分）
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// 单行数量上限
pub const MAX_QUANTITY: i32 = 1_000_000;

/// 按工时计费的行金额：round(minutes × rate / 60)；溢出返回 None
pub fn time_amount_cents(minutes: i32, hourly_rate_cents: i64) -> Option<i64> {
    i64::from(minutes)
        .checked_mul(hourly_rate_cents)
        .and_then(|n| round_div(n, 60))
}

/// 税额：round(subtotal × bp / 10000)；溢出返回 None
pub fn tax_cents(subtotal_cents: i64, tax_rate_bp: i32) -> Option<i64> {
    subtotal_cents
        .checked_mul(i64::from(tax_rate_bp))
        .and_then(|n| round_div(n, 10_000))
}

/// 四舍五入的整数除法（远离零）
fn round_div(numerator: i64, denominator: i64) -> Option<i64> {
    let half = denominator / 2;
    let shifted = if numerator >= 0 {
        numerator.checked_add(half)?
    } else {
        numerator.checked_sub(half)?
    };
    Some(shifted / denominator)
}

/// 计算 (subtotal, tax, total)；任一金额超过 MAX_AMOUNT_CENTS 时报 422
pub fn compute_totals(amounts: &[i64], tax_rate_bp: i32) -> Result<(i64, i64, i64)> {
    let too_large = || {
        NestogyError::invalid_field(
            "items",
            format!("invoice total must not exceed {} cents", MAX_AMOUNT_CENTS),
        )
    };
    let subtotal = amounts
        .iter()
        .try_fold(0i64, |acc, a| acc.checked_add(*a))
        .filter(|s| *s <= MAX_AMOUNT_CENTS)
        .ok_or_else(too_large)?;
    let tax = tax_cents(subtotal, tax_rate_bp).ok_or_else(too_large)?;
    let total = subtotal
        .checked_add(tax)
        .filter(|t| *t <= MAX_AMOUNT_CENTS)
        .ok_or_else(too_large)?;
    Ok((subtotal, tax, total))
}

/// INV-YYYY-NNNNN
pub fn format_invoice_number(year: i32, sequence: u32) -> String {
    format!("INV-{}-{:05}", year, sequence)
}

/// 解析编号中的序号；格式不符时返回 None
pub fn parse_invoice_sequence(number: &str, year: i32) -> Option<u32> {
    number
        .strip_prefix(&format!("INV-{}-", year))
        .and_then(|seq| seq.parse().ok())
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub unit_price_cents: i64,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceInput {
    pub client_id: Option<i32>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate_bp: Option<i32>,
    pub notes: Option<String>,
    /// 更新时提供则整体替换
    pub items: Option<Vec<InvoiceItemInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub client_id: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateFromTimeRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub client_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

/// 行项目的中间表示
struct LineDraft {
    description: String,
    quantity: i32,
    minutes: Option<i32>,
    unit_price_cents: i64,
    amount_cents: i64,
    time_entry_id: Option<i32>,
}

fn validate_items(items: &[InvoiceItemInput], errors: &mut FieldErrorsBuilder) -> Vec<LineDraft> {
    let mut lines = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let description = item.description.trim();
        if description.is_empty() {
            errors.add(format!("items.{}.description", idx), "is required");
        }
        if !(1..=MAX_QUANTITY).contains(&item.quantity) {
            errors.add(
                format!("items.{}.quantity", idx),
                format!("must be between 1 and {}", MAX_QUANTITY),
            );
        }
        if !(0..=MAX_AMOUNT_CENTS).contains(&item.unit_price_cents) {
            errors.add(
                format!("items.{}.unit_price_cents", idx),
                format!("must be between 0 and {}", MAX_AMOUNT_CENTS),
            );
        }
        let amount_cents = i64::from(item.quantity)
            .checked_mul(item.unit_price_cents)
            .filter(|a| (0..=MAX_AMOUNT_CENTS).contains(a));
        if amount_cents.is_none() && item.quantity >= 1 && item.unit_price_cents >= 0 {
            errors.add(
                format!("items.{}.unit_price_cents", idx),
                format!("line amount must not exceed {} cents", MAX_AMOUNT_CENTS),
            );
        }
        lines.push(LineDraft {
            description: description.to_string(),
            quantity: item.quantity,
            minutes: None,
            unit_price_cents: item.unit_price_cents,
            amount_cents: amount_cents.unwrap_or_default(),
            time_entry_id: None,
        });
    }
    lines
}

fn validate_tax(tax_rate_bp: i32, errors: &mut FieldErrorsBuilder) {
    if !(0..=10_000).contains(&tax_rate_bp) {
        errors.add("tax_rate_bp", "must be between 0 and 10000");
    }
}

pub struct InvoiceService {
    storage: Arc<SeaOrmStorage>,
}

impl InvoiceService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &InvoiceFilter,
        page: &PageRequest,
    ) -> Result<Paginated<invoice::Model>> {
        let mut select = invoice::Entity::find_in_tenant(ctx.company_id);
        if let Some(id) = filter.client_id {
            select = select.filter(invoice::Column::ClientId.eq(id));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<InvoiceStatus>("status", s)?;
            select = select.filter(invoice::Column::Status.eq(s.as_ref()));
        }
        let select = select
            .order_by_desc(invoice::Column::IssueDate)
            .order_by_desc(invoice::Column::Id);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<InvoiceDetail> {
        let db = self.storage.get_db();
        let found = find_scoped::<invoice::Entity, _>(db, ctx.company_id, id).await?;
        let items = load_items(db, found.id).await?;
        Ok(InvoiceDetail { invoice: found, items })
    }

    pub async fn create(&self, ctx: &TenantContext, input: InvoiceInput) -> Result<InvoiceDetail> {
        ctx.require_billing()?;
        let billing = get_config().billing.clone();

        let mut errors = FieldErrorsBuilder::new();
        if input.client_id.is_none() {
            errors.add("client_id", "is required");
        }
        let items = input.items.unwrap_or_default();
        if items.is_empty() {
            errors.add("items", "must contain at least one item");
        }
        let lines = validate_items(&items, &mut errors);
        let tax_rate_bp = input.tax_rate_bp.unwrap_or(billing.default_tax_rate_bp);
        validate_tax(tax_rate_bp, &mut errors);
        let issue_date = input.issue_date.unwrap_or_else(|| Utc::now().date_naive());
        let due_date = input.due_date.unwrap_or_else(|| {
            issue_date
                .checked_add_days(Days::new(u64::from(billing.payment_terms_days)))
                .unwrap_or(issue_date)
        });
        if due_date < issue_date {
            errors.add("due_date", "must be a date after or equal to issue_date");
        }
        errors.finish()?;

        let client_id = input.client_id.unwrap_or_default();
        ensure_client(self.storage.get_db(), ctx.company_id, client_id).await?;

        let txn = self.storage.begin().await?;
        let detail = insert_invoice(
            &txn,
            ctx.company_id,
            client_id,
            issue_date,
            due_date,
            tax_rate_bp,
            crate::utils::non_empty(input.notes),
            lines,
        )
        .await?;
        txn.commit().await?;

        info!(
            "InvoiceService: created invoice {} for client {} ({} cents)",
            detail.invoice.number, client_id, detail.invoice.total_cents
        );
        Ok(detail)
    }

    /// 修改发票；paid / void 的发票不可修改
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: InvoiceInput) -> Result<InvoiceDetail> {
        ctx.require_billing()?;
        let db = self.storage.get_db();
        let existing = find_scoped::<invoice::Entity, _>(db, ctx.company_id, id).await?;
        ensure_mutable(&existing)?;

        let mut errors = FieldErrorsBuilder::new();
        if input.client_id.is_some_and(|c| c != existing.client_id) {
            errors.add("client_id", "cannot be changed on an existing invoice");
        }
        let lines = match &input.items {
            Some(items) if items.is_empty() => {
                errors.add("items", "must contain at least one item");
                None
            }
            Some(items) => Some(validate_items(items, &mut errors)),
            None => None,
        };
        let tax_rate_bp = input.tax_rate_bp.unwrap_or(existing.tax_rate_bp);
        validate_tax(tax_rate_bp, &mut errors);
        let issue_date = input.issue_date.unwrap_or(existing.issue_date);
        let due_date = input.due_date.unwrap_or(existing.due_date);
        if due_date < issue_date {
            errors.add("due_date", "must be a date after or equal to issue_date");
        }
        errors.finish()?;

        let txn = self.storage.begin().await?;
        let items = match lines {
            Some(lines) => {
                // 替换行项目时，被移除的工时记录退回 approved
                release_time_entries(&txn, existing.id).await?;
                invoice_item::Entity::delete_many()
                    .filter(invoice_item::Column::InvoiceId.eq(existing.id))
                    .exec(&txn)
                    .await?;
                insert_items(&txn, existing.id, lines).await?
            }
            None => load_items(&txn, existing.id).await?,
        };
        let amounts: Vec<i64> = items.iter().map(|i| i.amount_cents).collect();
        let (subtotal, tax, total) = compute_totals(&amounts, tax_rate_bp)?;

        let mut model: invoice::ActiveModel = existing.into();
        model.issue_date = Set(issue_date);
        model.due_date = Set(due_date);
        model.tax_rate_bp = Set(tax_rate_bp);
        model.subtotal_cents = Set(subtotal);
        model.tax_cents = Set(tax);
        model.total_cents = Set(total);
        if let Some(notes) = input.notes {
            model.notes = Set(crate::utils::non_empty(Some(notes)));
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        Ok(InvoiceDetail { invoice: updated, items })
    }

    /// 状态流转：draft→sent→paid，draft|sent→void；作废时释放工时记录
    pub async fn transition(&self, ctx: &TenantContext, id: i32, next: &str) -> Result<invoice::Model> {
        ctx.require_billing()?;
        let next = parse_field::<InvoiceStatus>("status", next)?;
        let existing = find_scoped::<invoice::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        let current = parse_field::<InvoiceStatus>("status", &existing.status)?;
        if !current.can_transition_to(next) {
            return Err(NestogyError::invalid_field(
                "status",
                format!("cannot change status from {} to {}", current, next),
            ));
        }

        let now = Utc::now();
        let txn = self.storage.begin().await?;
        if next == InvoiceStatus::Void {
            release_time_entries(&txn, existing.id).await?;
        }
        let mut model: invoice::ActiveModel = existing.into();
        model.status = Set(next.to_string());
        match next {
            InvoiceStatus::Sent => model.sent_at = Set(Some(now)),
            InvoiceStatus::Paid => model.paid_at = Set(Some(now)),
            _ => {}
        }
        model.updated_at = Set(now);
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        info!("InvoiceService: invoice {} is now {}", updated.number, next);
        Ok(updated)
    }

    /// 只允许删除草稿
    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        ctx.require_billing()?;
        let existing = find_scoped::<invoice::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        if existing.status != InvoiceStatus::Draft.as_ref() {
            return Err(NestogyError::validation("Only draft invoices can be deleted; void it instead"));
        }

        let txn = self.storage.begin().await?;
        release_time_entries(&txn, existing.id).await?;
        invoice_item::Entity::delete_many()
            .filter(invoice_item::Column::InvoiceId.eq(existing.id))
            .exec(&txn)
            .await?;
        let number = existing.number.clone();
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!("InvoiceService: deleted draft invoice {}", number);
        Ok(())
    }

    /// 按客户把已审批、可计费、未开票的工时生成草稿发票；每个客户一个事务
    pub async fn generate_from_time(
        &self,
        ctx: &TenantContext,
        req: GenerateFromTimeRequest,
    ) -> Result<Vec<InvoiceDetail>> {
        ctx.require_billing()?;
        if req.to < req.from {
            return Err(NestogyError::invalid_field("to", "must be a date after or equal to from"));
        }

        let db = self.storage.get_db();
        let mut select = time_entry::Entity::find_in_tenant(ctx.company_id)
            .filter(time_entry::Column::Status.eq(TimeEntryStatus::Approved.as_ref()))
            .filter(time_entry::Column::Billable.eq(true))
            .filter(time_entry::Column::InvoiceId.is_null())
            .filter(time_entry::Column::WorkDate.gte(req.from))
            .filter(time_entry::Column::WorkDate.lte(req.to));
        if let Some(ids) = req.client_ids.as_ref().filter(|ids| !ids.is_empty()) {
            select = select.filter(time_entry::Column::ClientId.is_in(ids.iter().copied()));
        }
        let entries = select
            .order_by_asc(time_entry::Column::WorkDate)
            .order_by_asc(time_entry::Column::Id)
            .all(db)
            .await?;

        let mut by_client: BTreeMap<i32, Vec<time_entry::Model>> = BTreeMap::new();
        for entry in entries {
            by_client.entry(entry.client_id).or_default().push(entry);
        }

        let billing = get_config().billing.clone();
        let issue_date = Utc::now().date_naive();
        let due_date = issue_date
            .checked_add_days(Days::new(u64::from(billing.payment_terms_days)))
            .unwrap_or(issue_date);

        let mut generated = Vec::with_capacity(by_client.len());
        for (client_id, entries) in by_client {
            let txn = self.storage.begin().await?;
            let rate = resolve_rate(&txn, ctx.company_id, client_id).await?;
            let lines = entries
                .iter()
                .map(|e| {
                    let amount_cents = time_amount_cents(e.minutes, rate)
                        .filter(|a| *a <= MAX_AMOUNT_CENTS)
                        .ok_or_else(|| {
                            NestogyError::invalid_field(
                                "time_entries",
                                format!("amount for time entry #{} is too large", e.id),
                            )
                        })?;
                    Ok(LineDraft {
                        description: match e.description.as_deref() {
                            Some(d) => format!("{} {}", e.work_date, d),
                            None => format!("{} Time entry #{}", e.work_date, e.id),
                        },
                        quantity: 1,
                        minutes: Some(e.minutes),
                        unit_price_cents: rate,
                        amount_cents,
                        time_entry_id: Some(e.id),
                    })
                })
                .collect::<Result<Vec<LineDraft>>>()?;

            let detail = insert_invoice(
                &txn,
                ctx.company_id,
                client_id,
                issue_date,
                due_date,
                billing.default_tax_rate_bp,
                Some(format!("Time from {} to {}", req.from, req.to)),
                lines,
            )
            .await?;

            let ids: Vec<i32> = entries.iter().map(|e| e.id).collect();
            let marked = time_entry::Entity::update_many()
                .col_expr(time_entry::Column::Status, Expr::value(TimeEntryStatus::Invoiced.to_string()))
                .col_expr(time_entry::Column::InvoiceId, Expr::value(detail.invoice.id))
                .col_expr(time_entry::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(time_entry::Column::Id.is_in(ids.clone()))
                .filter(time_entry::Column::InvoiceId.is_null())
                .filter(time_entry::Column::Status.eq(TimeEntryStatus::Approved.as_ref()))
                .exec(&txn)
                .await?;
            if marked.rows_affected != ids.len() as u64 {
                // 其它请求抢先开票，整单回滚
                txn.rollback().await?;
                warn!(
                    "InvoiceService: time entries for client {} changed during generation, skipped",
                    client_id
                );
                continue;
            }
            txn.commit().await?;

            info!(
                "InvoiceService: generated {} from {} time entries ({} cents)",
                detail.invoice.number,
                ids.len(),
                detail.invoice.total_cents
            );
            generated.push(detail);
        }

        Ok(generated)
    }

    /// 会计导出：区间内已发出、已付款发票的明细 CSV（草稿和作废不导出）
    pub async fn export_accounting(&self, ctx: &TenantContext, query: &AccountingExportQuery) -> Result<String> {
        ctx.require_billing()?;
        if query.from > query.to {
            return Err(NestogyError::invalid_field("to", "must be on or after from"));
        }
        let db = self.storage.get_db();
        let invoices = invoice::Entity::find_in_tenant(ctx.company_id)
            .filter(invoice::Column::Status.is_in([InvoiceStatus::Sent.as_ref(), InvoiceStatus::Paid.as_ref()]))
            .filter(invoice::Column::IssueDate.gte(query.from))
            .filter(invoice::Column::IssueDate.lte(query.to))
            .order_by_asc(invoice::Column::IssueDate)
            .order_by_asc(invoice::Column::Id)
            .all(db)
            .await?;

        let currency = company::Entity::find_by_id(ctx.company_id)
            .one(db)
            .await?
            .map(|c| c.currency)
            .unwrap_or_default();
        let invoice_ids: Vec<i32> = invoices.iter().map(|i| i.id).collect();
        let client_ids: Vec<i32> = invoices.iter().map(|i| i.client_id).collect();
        let clients: HashMap<i32, String> = client::Entity::find_in_tenant(ctx.company_id)
            .filter(client::Column::Id.is_in(client_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let mut items: HashMap<i32, Vec<invoice_item::Model>> = HashMap::new();
        for item in invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.is_in(invoice_ids))
            .order_by_asc(invoice_item::Column::SortOrder)
            .order_by_asc(invoice_item::Column::Id)
            .all(db)
            .await?
        {
            items.entry(item.invoice_id).or_default().push(item);
        }

        let rows: Vec<AccountingCsvRow> = invoices
            .iter()
            .flat_map(|inv| {
                let client_name = clients.get(&inv.client_id).map(String::as_str).unwrap_or_default();
                let lines = items.get(&inv.id).map(Vec::as_slice).unwrap_or_default();
                accounting_rows(inv, client_name, &currency, lines)
            })
            .collect();
        info!(
            "InvoiceService: accounting export {}..{} wrote {} invoices ({} rows)",
            query.from,
            query.to,
            invoices.len(),
            rows.len()
        );
        write_rows(&rows)
    }
}

/// 会计导出查询参数（按开票日期，闭区间）
#[derive(Debug, Clone, Deserialize)]
pub struct AccountingExportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// 会计导出的一行：每个发票行一行，发票级金额在各行重复
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccountingCsvRow {
    pub invoice_number: String,
    pub client: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub line: usize,
    pub description: String,
    pub quantity: i32,
    pub unit_price: String,
    pub line_amount: String,
    pub invoice_subtotal: String,
    pub invoice_tax: String,
    pub invoice_total: String,
    pub currency: String,
}

/// 分转两位小数字符串
pub fn format_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn accounting_rows(
    inv: &invoice::Model,
    client_name: &str,
    currency: &str,
    items: &[invoice_item::Model],
) -> Vec<AccountingCsvRow> {
    let row = |line: usize, description: String, quantity: i32, unit: i64, amount: i64| AccountingCsvRow {
        invoice_number: inv.number.clone(),
        client: client_name.to_string(),
        issue_date: inv.issue_date,
        due_date: inv.due_date,
        status: inv.status.clone(),
        line,
        description,
        quantity,
        unit_price: format_decimal(unit),
        line_amount: format_decimal(amount),
        invoice_subtotal: format_decimal(inv.subtotal_cents),
        invoice_tax: format_decimal(inv.tax_cents),
        invoice_total: format_decimal(inv.total_cents),
        currency: currency.to_string(),
    };
    if items.is_empty() {
        return vec![row(0, String::new(), 0, 0, 0)];
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            row(
                i + 1,
                item.description.clone(),
                item.quantity,
                item.unit_price_cents,
                item.amount_cents,
            )
        })
        .collect()
}

fn ensure_mutable(inv: &invoice::Model) -> Result<()> {
    let status = parse_field::<InvoiceStatus>("status", &inv.status)?;
    if status.is_final() {
        return Err(NestogyError::validation(format!(
            "Invoice {} is {} and can no longer be changed",
            inv.number, status
        )));
    }
    Ok(())
}

async fn ensure_client<C: ConnectionTrait>(db: &C, company_id: i32, client_id: i32) -> Result<()> {
    client::Entity::find_in_tenant(company_id)
        .filter(client::Column::Id.eq(client_id))
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| NestogyError::invalid_field("client_id", "does not exist"))
}

async fn load_items<C: ConnectionTrait>(db: &C, invoice_id: i32) -> Result<Vec<invoice_item::Model>> {
    Ok(invoice_item::Entity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_item::Column::SortOrder)
        .all(db)
        .await?)
}

/// 下一个发票编号（在调用方事务内）；按解析后的序号取最大值，超过五位时字符串排序不可靠
async fn next_invoice_number(txn: &DatabaseTransaction, company_id: i32, year: i32) -> Result<String> {
    let prefix = format!("INV-{}-", year);
    let numbers: Vec<String> = invoice::Entity::find_in_tenant(company_id)
        .filter(invoice::Column::Number.starts_with(prefix.as_str()))
        .select_only()
        .column(invoice::Column::Number)
        .into_tuple()
        .all(txn)
        .await?;
    Ok(format_invoice_number(year, next_sequence(&numbers, year)))
}

/// 已有编号中最大序号 + 1
fn next_sequence(numbers: &[String], year: i32) -> u32 {
    numbers
        .iter()
        .filter_map(|n| parse_invoice_sequence(n, year))
        .max()
        .map(|seq| seq.saturating_add(1))
        .unwrap_or(1)
}

#[allow(clippy::too_many_arguments)]
async fn insert_invoice(
    txn: &DatabaseTransaction,
    company_id: i32,
    client_id: i32,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    tax_rate_bp: i32,
    notes: Option<String>,
    lines: Vec<LineDraft>,
) -> Result<InvoiceDetail> {
    let amounts: Vec<i64> = lines.iter().map(|l| l.amount_cents).collect();
    let (subtotal, tax, total) = compute_totals(&amounts, tax_rate_bp)?;
    let number = next_invoice_number(txn, company_id, issue_date.year()).await?;

    let now = Utc::now();
    let created = invoice::ActiveModel {
        company_id: Set(company_id),
        client_id: Set(client_id),
        number: Set(number),
        status: Set(InvoiceStatus::Draft.to_string()),
        issue_date: Set(issue_date),
        due_date: Set(due_date),
        subtotal_cents: Set(subtotal),
        tax_rate_bp: Set(tax_rate_bp),
        tax_cents: Set(tax),
        total_cents: Set(total),
        notes: Set(notes),
        sent_at: Set(None),
        paid_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let items = insert_items(txn, created.id, lines).await?;
    Ok(InvoiceDetail {
        invoice: created,
        items,
    })
}

async fn insert_items(
    txn: &DatabaseTransaction,
    invoice_id: i32,
    lines: Vec<LineDraft>,
) -> Result<Vec<invoice_item::Model>> {
    let mut items = Vec::with_capacity(lines.len());
    for (idx, line) in lines.into_iter().enumerate() {
        let item = invoice_item::ActiveModel {
            invoice_id: Set(invoice_id),
            description: Set(line.description),
            quantity: Set(line.quantity),
            minutes: Set(line.minutes),
            unit_price_cents: Set(line.unit_price_cents),
            amount_cents: Set(line.amount_cents),
            time_entry_id: Set(line.time_entry_id),
            sort_order: Set(idx as i32),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        items.push(item);
    }
    Ok(items)
}

/// 发票上的工时记录退回 approved
async fn release_time_entries(txn: &DatabaseTransaction, invoice_id: i32) -> Result<()> {
    time_entry::Entity::update_many()
        .col_expr(time_entry::Column::Status, Expr::value(TimeEntryStatus::Approved.to_string()))
        .col_expr(time_entry::Column::InvoiceId, Expr::value(Option::<i32>::None))
        .col_expr(time_entry::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(time_entry::Column::InvoiceId.eq(invoice_id))
        .exec(txn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(0), "0.00");
        assert_eq!(format_decimal(5), "0.05");
        assert_eq!(format_decimal(123_456), "1234.56");
        assert_eq!(format_decimal(-250), "-2.50");
        assert_eq!(format_decimal(i64::MIN), "-92233720368547758.08");
    }

    #[test]
    fn test_accounting_rows_repeat_invoice_totals() {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let inv = invoice::Model {
            id: 1,
            company_id: 1,
            client_id: 2,
            number: "INV-2026-00001".into(),
            status: "sent".into(),
            issue_date: date,
            due_date: date,
            subtotal_cents: 30_000,
            tax_rate_bp: 1_000,
            tax_cents: 3_000,
            total_cents: 33_000,
            notes: None,
            sent_at: Some(now),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let item = |id, amount| invoice_item::Model {
            id,
            invoice_id: 1,
            description: format!("Line {}", id),
            quantity: 1,
            minutes: None,
            unit_price_cents: amount,
            amount_cents: amount,
            time_entry_id: None,
            sort_order: id,
        };
        let rows = accounting_rows(&inv, "Acme", "USD", &[item(1, 10_000), item(2, 20_000)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[1].line_amount, "200.00");
        assert!(rows.iter().all(|r| r.invoice_total == "330.00" && r.currency == "USD"));

        let empty = accounting_rows(&inv, "Acme", "USD", &[]);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].line, 0);
        assert_eq!(empty[0].invoice_tax, "30.00");
    }

    #[test]
    fn test_time_amount_rounds_half_up() {
        // 90 分钟 × 150.00/h = 225.00
        assert_eq!(time_amount_cents(90, 15_000), Some(22_500));
        // 1 分钟 × 100.00/h = 1.666… → 1.67
        assert_eq!(time_amount_cents(1, 10_000), Some(167));
        // 1 分钟 × 0.30/h = 0.5 分 → 1
        assert_eq!(time_amount_cents(1, 30), Some(1));
        assert_eq!(time_amount_cents(7, 0), Some(0));
        assert_eq!(time_amount_cents(i32::MAX, i64::MAX / 2), None);
    }

    #[test]
    fn test_tax_and_totals() {
        assert_eq!(tax_cents(10_000, 825), Some(825));
        // 333 × 7.5% = 24.975 → 25
        assert_eq!(tax_cents(333, 750), Some(25));
        assert_eq!(compute_totals(&[10_000, 2_500], 1_000).unwrap(), (12_500, 1_250, 13_750));
        assert_eq!(compute_totals(&[], 1_000).unwrap(), (0, 0, 0));
    }

    #[test]
    fn test_totals_reject_overflow() {
        let err = compute_totals(&[MAX_AMOUNT_CENTS, 1], 0).unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("items"));
        assert!(compute_totals(&[i64::MAX, i64::MAX], 0).is_err());
        // 含税后超过上限
        assert!(compute_totals(&[MAX_AMOUNT_CENTS], 1).is_err());
    }

    #[test]
    fn test_invoice_numbers() {
        assert_eq!(format_invoice_number(2026, 7), "INV-2026-00007");
        assert_eq!(format_invoice_number(2026, 123_456), "INV-2026-123456");
        assert_eq!(parse_invoice_sequence("INV-2026-00042", 2026), Some(42));
        assert_eq!(parse_invoice_sequence("INV-2025-00042", 2026), None);
        assert_eq!(parse_invoice_sequence("INV-2026-abc", 2026), None);
    }

    #[test]
    fn test_next_sequence_orders_numerically() {
        let numbers: Vec<String> = ["INV-2026-99999", "INV-2026-100000", "INV-2026-00003"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        // 字符串排序时 "INV-2026-99999" 会排在最后
        assert_eq!(next_sequence(&numbers, 2026), 100_001);
        assert_eq!(next_sequence(&[], 2026), 1);
        assert_eq!(next_sequence(&["INV-2026-junk".to_string()], 2026), 1);
    }

    #[test]
    fn test_validate_items() {
        let mut errors = FieldErrorsBuilder::new();
        let lines = validate_items(
            &[InvoiceItemInput {
                description: "Firewall".into(),
                quantity: 2,
                unit_price_cents: 45_000,
            }],
            &mut errors,
        );
        assert!(errors.is_empty());
        assert_eq!(lines[0].amount_cents, 90_000);

        validate_items(
            &[InvoiceItemInput {
                description: " ".into(),
                quantity: 0,
                unit_price_cents: -1,
            }],
            &mut errors,
        );
        let err = errors.finish().unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("items.0.description"));
        assert!(fields.contains_key("items.0.quantity"));
        assert!(fields.contains_key("items.0.unit_price_cents"));
    }

    #[test]
    fn test_validate_items_rejects_huge_amounts() {
        let mut errors = FieldErrorsBuilder::new();
        validate_items(
            &[InvoiceItemInput {
                description: "Rack".into(),
                quantity: 2,
                unit_price_cents: i64::MAX / 2 + 1,
            }],
            &mut errors,
        );
        let err = errors.finish().unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("items.0.unit_price_cents"));

        // 单价在范围内，但数量乘积越界
        let mut errors = FieldErrorsBuilder::new();
        validate_items(
            &[InvoiceItemInput {
                description: "Rack".into(),
                quantity: MAX_QUANTITY,
                unit_price_cents: MAX_AMOUNT_CENTS,
            }],
            &mut errors,
        );
        assert!(errors.finish().is_err());
    }
}
