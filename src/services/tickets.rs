//! Ticketing

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{TicketPriority, TicketSource, TicketStatus, deserialize_some, parse_field};
use crate::services::TenantContext;
use crate::storage::{
    PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, is_unique_violation, paginate,
};
use migration::entities::{asset, client, ticket, time_entry, user};

/// 编号冲突时的重试次数
const NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketInput {
    pub client_id: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub asset_id: Option<Option<i32>>,
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub source: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assignee_id: Option<Option<i32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub client_id: Option<i32>,
    pub asset_id: Option<i32>,
    pub assignee_id: Option<i32>,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// 只看未解决的工单
    #[serde(default)]
    pub open_only: bool,
    pub search: Option<String>,
}

/// 系统内部（RMM 告警等）开单参数
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub client_id: i32,
    pub asset_id: Option<i32>,
    pub subject: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub source: TicketSource,
    pub assignee_id: Option<i32>,
    pub created_by: Option<i32>,
}

/// 状态变化后的 (resolved_at, closed_at)
///
/// 进入 resolved / closed 时打时间戳，重新打开时清空。
pub fn status_timestamps(
    current: Option<TicketStatus>,
    next: TicketStatus,
    resolved_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match next {
        TicketStatus::Resolved => {
            let resolved = if current == Some(TicketStatus::Resolved) {
                resolved_at.or(Some(now))
            } else {
                Some(now)
            };
            (resolved, None)
        }
        TicketStatus::Closed => {
            let closed = if current == Some(TicketStatus::Closed) {
                closed_at.or(Some(now))
            } else {
                Some(now)
            };
            (resolved_at, closed)
        }
        _ => (None, None),
    }
}

pub fn is_open_status(status: TicketStatus) -> bool {
    !matches!(status, TicketStatus::Resolved | TicketStatus::Closed)
}

pub struct TicketService {
    storage: Arc<SeaOrmStorage>,
    events: Arc<EventBus>,
}

impl TicketService {
    pub fn new(storage: Arc<SeaOrmStorage>, events: Arc<EventBus>) -> Self {
        Self { storage, events }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &TicketFilter,
        page: &PageRequest,
    ) -> Result<Paginated<ticket::Model>> {
        let mut select = ticket::Entity::find_in_tenant(ctx.company_id);
        if let Some(id) = filter.client_id {
            select = select.filter(ticket::Column::ClientId.eq(id));
        }
        if let Some(id) = filter.asset_id {
            select = select.filter(ticket::Column::AssetId.eq(id));
        }
        if let Some(id) = filter.assignee_id {
            select = select.filter(ticket::Column::AssigneeId.eq(id));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<TicketStatus>("status", s)?;
            select = select.filter(ticket::Column::Status.eq(s.as_ref()));
        }
        if let Some(p) = filter.priority.as_deref().filter(|s| !s.is_empty()) {
            let p = parse_field::<TicketPriority>("priority", p)?;
            select = select.filter(ticket::Column::Priority.eq(p.as_ref()));
        }
        if filter.open_only {
            select = select.filter(ticket::Column::Status.is_not_in([
                TicketStatus::Resolved.as_ref(),
                TicketStatus::Closed.as_ref(),
            ]));
        }
        if let Some(q) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(ticket::Column::Subject.contains(q));
        }
        let select = select.order_by_desc(ticket::Column::Number);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<ticket::Model> {
        find_scoped::<ticket::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    pub async fn create(&self, ctx: &TenantContext, input: TicketInput) -> Result<ticket::Model> {
        let mut errors = FieldErrorsBuilder::new();
        let subject = input.subject.as_deref().map(str::trim).unwrap_or_default();
        if subject.is_empty() {
            errors.add("subject", "is required");
        }
        if input.client_id.is_none() {
            errors.add("client_id", "is required");
        }
        let status = parse_or_default(&mut errors, "status", input.status.as_deref(), TicketStatus::New);
        let priority = parse_or_default(&mut errors, "priority", input.priority.as_deref(), TicketPriority::Medium);
        let source = parse_or_default(&mut errors, "source", input.source.as_deref(), TicketSource::Manual);
        errors.finish()?;

        let draft = NewTicket {
            client_id: input.client_id.unwrap_or_default(),
            asset_id: input.asset_id.flatten(),
            subject: subject.to_string(),
            description: input.description.flatten().filter(|d| !d.trim().is_empty()),
            status,
            priority,
            source,
            assignee_id: input.assignee_id.flatten(),
            created_by: Some(ctx.user_id),
        };
        self.open(ctx.company_id, draft).await
    }

    /// 开单：编号在插入事务内按 max(number)+1 分配
    pub async fn open(&self, company_id: i32, draft: NewTicket) -> Result<ticket::Model> {
        let db = self.storage.get_db();
        ensure_client(db, company_id, draft.client_id).await?;
        if let Some(asset_id) = draft.asset_id {
            ensure_asset_of_client(db, company_id, asset_id, draft.client_id).await?;
        }
        if let Some(assignee) = draft.assignee_id {
            ensure_user(db, company_id, assignee).await?;
        }

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            match self.insert_numbered(company_id, &draft).await {
                Ok(created) => break created,
                Err(InsertError::Duplicate) if attempt < NUMBER_ATTEMPTS => {
                    warn!("TicketService: ticket number collision, retrying ({})", attempt);
                }
                Err(InsertError::Duplicate) => {
                    return Err(NestogyError::database_operation(
                        "Could not allocate a ticket number",
                    ));
                }
                Err(InsertError::Other(e)) => return Err(e),
            }
        };

        info!(
            "TicketService: opened ticket #{} (id {}) for client {}",
            created.number, created.id, created.client_id
        );
        self.events
            .publish(DomainEvent::TicketCreated {
                company_id,
                ticket_id: created.id,
                client_id: created.client_id,
            })
            .await;
        Ok(created)
    }

    async fn insert_numbered(&self, company_id: i32, draft: &NewTicket) -> std::result::Result<ticket::Model, InsertError> {
        let txn = self.storage.begin().await?;
        let last = ticket::Entity::find_in_tenant(company_id)
            .order_by_desc(ticket::Column::Number)
            .one(&txn)
            .await
            .map_err(NestogyError::from)?;
        let number = last.map(|t| t.number + 1).unwrap_or(1);

        let now = Utc::now();
        let (resolved_at, closed_at) = status_timestamps(None, draft.status, None, None, now);
        let inserted = ticket::ActiveModel {
            company_id: Set(company_id),
            client_id: Set(draft.client_id),
            asset_id: Set(draft.asset_id),
            number: Set(number),
            subject: Set(draft.subject.clone()),
            description: Set(draft.description.clone()),
            status: Set(draft.status.to_string()),
            priority: Set(draft.priority.to_string()),
            source: Set(draft.source.to_string()),
            assignee_id: Set(draft.assignee_id),
            created_by: Set(draft.created_by),
            resolved_at: Set(resolved_at),
            closed_at: Set(closed_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await;

        match inserted {
            Ok(model) => {
                txn.commit().await.map_err(NestogyError::from)?;
                Ok(model)
            }
            Err(e) if is_unique_violation(&e) => Err(InsertError::Duplicate),
            Err(e) => Err(InsertError::Other(e.into())),
        }
    }

    pub async fn update(&self, ctx: &TenantContext, id: i32, input: TicketInput) -> Result<ticket::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<ticket::Entity, _>(db, ctx.company_id, id).await?;

        let mut errors = FieldErrorsBuilder::new();
        let subject = input.subject.as_deref().map(str::trim);
        if subject == Some("") {
            errors.add("subject", "is required");
        }
        let status = input
            .status
            .as_deref()
            .and_then(|s| errors.capture("status", parse_field::<TicketStatus>("status", s)));
        let priority = input
            .priority
            .as_deref()
            .and_then(|s| errors.capture("priority", parse_field::<TicketPriority>("priority", s)));
        errors.finish()?;

        let client_id = input.client_id.unwrap_or(existing.client_id);
        if client_id != existing.client_id {
            ensure_client(db, ctx.company_id, client_id).await?;
        }
        let asset_id = match input.asset_id {
            Some(value) => value,
            None => existing.asset_id,
        };
        if let Some(asset_id) = asset_id {
            ensure_asset_of_client(db, ctx.company_id, asset_id, client_id).await?;
        }
        if let Some(Some(assignee)) = input.assignee_id {
            ensure_user(db, ctx.company_id, assignee).await?;
        }

        let current = parse_field::<TicketStatus>("status", &existing.status).ok();
        let (resolved_at, closed_at) = match status {
            Some(next) => status_timestamps(current, next, existing.resolved_at, existing.closed_at, Utc::now()),
            None => (existing.resolved_at, existing.closed_at),
        };

        let mut model: ticket::ActiveModel = existing.into();
        model.client_id = Set(client_id);
        model.asset_id = Set(asset_id);
        if let Some(subject) = subject {
            model.subject = Set(subject.to_string());
        }
        if let Some(description) = input.description {
            model.description = Set(description.filter(|d| !d.trim().is_empty()));
        }
        if let Some(next) = status {
            model.status = Set(next.to_string());
        }
        if let Some(p) = priority {
            model.priority = Set(p.to_string());
        }
        if let Some(assignee) = input.assignee_id {
            model.assignee_id = Set(assignee);
        }
        model.resolved_at = Set(resolved_at);
        model.closed_at = Set(closed_at);
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;

        info!("TicketService: updated ticket #{} ({})", updated.number, updated.status);
        Ok(updated)
    }

    /// 删除工单；已登记工时的工单不能删除
    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let existing = find_scoped::<ticket::Entity, _>(db, ctx.company_id, id).await?;
        let logged = time_entry::Entity::find_in_tenant(ctx.company_id)
            .filter(time_entry::Column::TicketId.eq(id))
            .count(db)
            .await?;
        if logged > 0 {
            return Err(NestogyError::validation(format!(
                "Ticket #{} has {} time entries and cannot be deleted",
                existing.number, logged
            )));
        }
        let number = existing.number;
        existing.delete(db).await?;
        info!("TicketService: deleted ticket #{}", number);
        Ok(())
    }
}

enum InsertError {
    Duplicate,
    Other(NestogyError),
}

impl From<NestogyError> for InsertError {
    fn from(e: NestogyError) -> Self {
        InsertError::Other(e)
    }
}

fn parse_or_default<T>(errors: &mut FieldErrorsBuilder, field: &str, value: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + strum::IntoEnumIterator + AsRef<str> + Copy,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => errors.capture(field, parse_field::<T>(field, v)).unwrap_or(default),
        None => default,
    }
}

async fn ensure_client<C: ConnectionTrait>(db: &C, company_id: i32, client_id: i32) -> Result<()> {
    client::Entity::find_in_tenant(company_id)
        .filter(client::Column::Id.eq(client_id))
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| NestogyError::invalid_field("client_id", "does not exist"))
}

async fn ensure_asset_of_client<C: ConnectionTrait>(
    db: &C,
    company_id: i32,
    asset_id: i32,
    client_id: i32,
) -> Result<()> {
    let found = asset::Entity::find_in_tenant(company_id)
        .filter(asset::Column::Id.eq(asset_id))
        .one(db)
        .await?
        .ok_or_else(|| NestogyError::invalid_field("asset_id", "does not exist"))?;
    if found.client_id != client_id {
        return Err(NestogyError::invalid_field(
            "asset_id",
            "asset does not belong to the ticket's client",
        ));
    }
    Ok(())
}

async fn ensure_user<C: ConnectionTrait>(db: &C, company_id: i32, user_id: i32) -> Result<()> {
    user::Entity::find_in_tenant(company_id)
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::IsActive.eq(true))
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| NestogyError::invalid_field("assignee_id", "does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_entering_resolved_stamps_time() {
        let now = Utc::now();
        let (resolved, closed) = status_timestamps(Some(TicketStatus::Open), TicketStatus::Resolved, None, None, now);
        assert_eq!(resolved, Some(now));
        assert_eq!(closed, None);
    }

    #[test]
    fn test_staying_resolved_keeps_original_time() {
        let earlier = Utc::now() - Duration::hours(3);
        let now = Utc::now();
        let (resolved, _) = status_timestamps(
            Some(TicketStatus::Resolved),
            TicketStatus::Resolved,
            Some(earlier),
            None,
            now,
        );
        assert_eq!(resolved, Some(earlier));
    }

    #[test]
    fn test_closing_keeps_resolved_time() {
        let earlier = Utc::now() - Duration::hours(3);
        let now = Utc::now();
        let (resolved, closed) = status_timestamps(
            Some(TicketStatus::Resolved),
            TicketStatus::Closed,
            Some(earlier),
            None,
            now,
        );
        assert_eq!(resolved, Some(earlier));
        assert_eq!(closed, Some(now));
    }

    #[test]
    fn test_reopen_clears_timestamps() {
        let now = Utc::now();
        let (resolved, closed) = status_timestamps(
            Some(TicketStatus::Closed),
            TicketStatus::Open,
            Some(now),
            Some(now),
            now,
        );
        assert_eq!((resolved, closed), (None, None));
    }

    #[test]
    fn test_is_open_status() {
        assert!(is_open_status(TicketStatus::Waiting));
        assert!(!is_open_status(TicketStatus::Closed));
    }

    #[test]
    fn test_parse_or_default() {
        let mut errors = FieldErrorsBuilder::new();
        assert_eq!(
            parse_or_default(&mut errors, "priority", None, TicketPriority::Medium),
            TicketPriority::Medium
        );
        assert_eq!(
            parse_or_default(&mut errors, "priority", Some("HIGH"), TicketPriority::Medium),
            TicketPriority::High
        );
        assert!(errors.is_empty());
        parse_or_default(&mut errors, "priority", Some("urgent"), TicketPriority::Medium);
        assert!(!errors.is_empty());
    }
}
