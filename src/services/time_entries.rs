//! Billable time entries and their approval

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{TimeEntryStatus, deserialize_some, parse_field};
use crate::services::TenantContext;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use migration::entities::{client, ticket, time_entry};

/// 单条记录最多一天
const MAX_MINUTES: i32 = 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeEntryInput {
    pub client_id: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub ticket_id: Option<Option<i32>>,
    pub work_date: Option<NaiveDate>,
    pub minutes: Option<i32>,
    pub description: Option<String>,
    pub billable: Option<bool>,
    /// 只允许 draft / submitted
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeEntryFilter {
    pub user_id: Option<i32>,
    pub client_id: Option<i32>,
    pub ticket_id: Option<i32>,
    pub status: Option<String>,
    pub billable: Option<bool>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReviewSkipped {
    pub id: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewResult {
    pub updated: Vec<i32>,
    pub skipped: Vec<ReviewSkipped>,
}

fn validate_minutes(minutes: i32, errors: &mut FieldErrorsBuilder) {
    if !(1..=MAX_MINUTES).contains(&minutes) {
        errors.add("minutes", format!("must be between 1 and {}", MAX_MINUTES));
    }
}

fn parse_author_status(raw: Option<&str>, errors: &mut FieldErrorsBuilder) -> Option<TimeEntryStatus> {
    let status = errors.capture("status", parse_field::<TimeEntryStatus>("status", raw?))?;
    if matches!(status, TimeEntryStatus::Draft | TimeEntryStatus::Submitted) {
        Some(status)
    } else {
        errors.add("status", "may only be set to draft or submitted");
        None
    }
}

pub struct TimeEntryService {
    storage: Arc<SeaOrmStorage>,
}

impl TimeEntryService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &TimeEntryFilter,
        page: &PageRequest,
    ) -> Result<Paginated<time_entry::Model>> {
        let mut select = time_entry::Entity::find_in_tenant(ctx.company_id);
        let user_filter = if ctx.require_billing().is_ok() {
            filter.user_id
        } else {
            Some(ctx.user_id)
        };
        if let Some(id) = user_filter {
            select = select.filter(time_entry::Column::UserId.eq(id));
        }
        if let Some(id) = filter.client_id {
            select = select.filter(time_entry::Column::ClientId.eq(id));
        }
        if let Some(id) = filter.ticket_id {
            select = select.filter(time_entry::Column::TicketId.eq(id));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<TimeEntryStatus>("status", s)?;
            select = select.filter(time_entry::Column::Status.eq(s.as_ref()));
        }
        if let Some(b) = filter.billable {
            select = select.filter(time_entry::Column::Billable.eq(b));
        }
        if let Some(from) = filter.from {
            select = select.filter(time_entry::Column::WorkDate.gte(from));
        }
        if let Some(to) = filter.to {
            select = select.filter(time_entry::Column::WorkDate.lte(to));
        }
        let select = select
            .order_by_desc(time_entry::Column::WorkDate)
            .order_by_desc(time_entry::Column::Id);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<time_entry::Model> {
        let entry = find_scoped::<time_entry::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        if entry.user_id != ctx.user_id && ctx.require_billing().is_err() {
            return Err(NestogyError::not_found(format!("Time entry {} not found", id)));
        }
        Ok(entry)
    }

    pub async fn create(&self, ctx: &TenantContext, input: TimeEntryInput) -> Result<time_entry::Model> {
        let db = self.storage.get_db();
        let mut errors = FieldErrorsBuilder::new();
        if input.client_id.is_none() {
            errors.add("client_id", "is required");
        }
        if input.work_date.is_none() {
            errors.add("work_date", "is required");
        }
        match input.minutes {
            Some(m) => validate_minutes(m, &mut errors),
            None => errors.add("minutes", "is required"),
        }
        let status = parse_author_status(input.status.as_deref(), &mut errors);
        errors.finish()?;

        let client_id = input.client_id.unwrap_or_default();
        let ticket_id = input.ticket_id.flatten();
        ensure_client(db, ctx.company_id, client_id).await?;
        if let Some(ticket_id) = ticket_id {
            ensure_ticket_of_client(db, ctx.company_id, ticket_id, client_id).await?;
        }

        let now = Utc::now();
        let created = time_entry::ActiveModel {
            company_id: Set(ctx.company_id),
            user_id: Set(ctx.user_id),
            client_id: Set(client_id),
            ticket_id: Set(ticket_id),
            work_date: Set(input.work_date.unwrap_or_default()),
            minutes: Set(input.minutes.unwrap_or_default()),
            description: Set(crate::utils::non_empty(input.description)),
            billable: Set(input.billable.unwrap_or(true)),
            status: Set(status.unwrap_or(TimeEntryStatus::Draft).to_string()),
            invoice_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(
            "TimeEntryService: user {} logged {} minutes for client {}",
            ctx.user_id, created.minutes, client_id
        );
        Ok(created)
    }

    /// 已审批或已开票的记录不可修改
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: TimeEntryInput) -> Result<time_entry::Model> {
        let db = self.storage.get_db();
        let entry = self.get(ctx, id).await?;
        ensure_editable(&entry)?;

        let mut errors = FieldErrorsBuilder::new();
        if let Some(m) = input.minutes {
            validate_minutes(m, &mut errors);
        }
        let status = parse_author_status(input.status.as_deref(), &mut errors);
        errors.finish()?;

        let client_id = input.client_id.unwrap_or(entry.client_id);
        if client_id != entry.client_id {
            ensure_client(db, ctx.company_id, client_id).await?;
        }
        let ticket_id = input.ticket_id.unwrap_or(entry.ticket_id);
        if let Some(ticket_id) = ticket_id {
            ensure_ticket_of_client(db, ctx.company_id, ticket_id, client_id).await?;
        }

        let mut model: time_entry::ActiveModel = entry.into();
        model.client_id = Set(client_id);
        model.ticket_id = Set(ticket_id);
        if let Some(d) = input.work_date {
            model.work_date = Set(d);
        }
        if let Some(m) = input.minutes {
            model.minutes = Set(m);
        }
        if let Some(d) = input.description {
            model.description = Set(crate::utils::non_empty(Some(d)));
        }
        if let Some(b) = input.billable {
            model.billable = Set(b);
        }
        if let Some(s) = status {
            model.status = Set(s.to_string());
        }
        model.updated_at = Set(Utc::now());
        Ok(model.update(db).await?)
    }

    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let entry = self.get(ctx, id).await?;
        ensure_editable(&entry)?;
        entry.delete(self.storage.get_db()).await?;
        info!("TimeEntryService: deleted time entry {}", id);
        Ok(())
    }

    pub async fn approve(&self, ctx: &TenantContext, ids: &[i32]) -> Result<ReviewResult> {
        self.review(ctx, ids, TimeEntryStatus::Approved).await
    }

    pub async fn reject(&self, ctx: &TenantContext, ids: &[i32]) -> Result<ReviewResult> {
        self.review(ctx, ids, TimeEntryStatus::Rejected).await
    }

    /// 批量审批：只处理 submitted 状态的记录，其余记入 skipped
    async fn review(&self, ctx: &TenantContext, ids: &[i32], next: TimeEntryStatus) -> Result<ReviewResult> {
        ctx.require_billing()?;
        if ids.is_empty() {
            return Err(NestogyError::invalid_field("ids", "must contain at least one id"));
        }

        let txn = self.storage.begin().await?;
        let mut result = ReviewResult::default();
        for &id in ids {
            let Some(entry) = time_entry::Entity::find_in_tenant(ctx.company_id)
                .filter(time_entry::Column::Id.eq(id))
                .one(&txn)
                .await?
            else {
                result.skipped.push(ReviewSkipped {
                    id,
                    reason: "not found".to_string(),
                });
                continue;
            };
            if entry.status != TimeEntryStatus::Submitted.as_ref() {
                result.skipped.push(ReviewSkipped {
                    id,
                    reason: format!("status is {}", entry.status),
                });
                continue;
            }

            let mut model: time_entry::ActiveModel = entry.into();
            model.status = Set(next.to_string());
            model.updated_at = Set(Utc::now());
            model.update(&txn).await?;
            result.updated.push(id);
        }
        txn.commit().await?;

        info!(
            "TimeEntryService: {} {} entries ({} skipped)",
            next,
            result.updated.len(),
            result.skipped.len()
        );
        Ok(result)
    }
}

fn ensure_editable(entry: &time_entry::Model) -> Result<()> {
    let status = parse_field::<TimeEntryStatus>("status", &entry.status)?;
    if status.is_locked() {
        return Err(NestogyError::validation(format!(
            "Time entry {} is {} and can no longer be changed",
            entry.id, status
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

async fn ensure_ticket_of_client<C: ConnectionTrait>(
    db: &C,
    company_id: i32,
    ticket_id: i32,
    client_id: i32,
) -> Result<()> {
    let found = ticket::Entity::find_in_tenant(company_id)
        .filter(ticket::Column::Id.eq(ticket_id))
        .one(db)
        .await?
        .ok_or_else(|| NestogyError::invalid_field("ticket_id", "does not exist"))?;
    if found.client_id != client_id {
        return Err(NestogyError::invalid_field(
            "ticket_id",
            "ticket belongs to a different client",
        ));
    }
    Ok(())
}
