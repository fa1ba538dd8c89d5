//! 入站 webhook 事件的落库、去重与状态记录

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, ExprTrait,
    QueryFilter, QueryOrder, sea_query::Expr,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{NestogyError, Result};
use crate::models::WebhookEventStatus;
use crate::storage::backend::retry::{RetryConfig, with_retry};
use crate::storage::is_unique_violation;
use migration::entities::webhook_event;

/// PostGrid 事件的 source
pub const POSTGRID_SOURCE: &str = "postgrid";

pub fn rmm_source(integration_id: i32) -> String {
    format!("rmm:{}", integration_id)
}

/// 从 `rmm:<id>` 中取出集成 id
pub fn parse_rmm_source(source: &str) -> Option<i32> {
    source.strip_prefix("rmm:").and_then(|id| id.parse().ok())
}

/// Webhook 接收结果
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub event_id: i32,
    pub duplicate: bool,
}

pub struct NewWebhookEvent<'a> {
    pub company_id: Option<i32>,
    pub source: &'a str,
    pub external_id: &'a str,
    pub event_type: Option<String>,
    pub payload: &'a str,
}

/// 在 (source, external_id) 唯一索引下插入事件；重复时返回已有记录
pub async fn record_event(
    db: &DatabaseConnection,
    retry: RetryConfig,
    event: NewWebhookEvent<'_>,
) -> Result<(webhook_event::Model, bool)> {
    let inserted = with_retry("record_webhook_event", retry, || {
        webhook_event::ActiveModel {
            company_id: Set(event.company_id),
            source: Set(event.source.to_string()),
            external_id: Set(event.external_id.to_string()),
            event_type: Set(event.event_type.clone()),
            payload: Set(event.payload.to_string()),
            status: Set(WebhookEventStatus::Pending.to_string()),
            attempts: Set(0),
            error: Set(None),
            received_at: Set(Utc::now()),
            processed_at: Set(None),
            ..Default::default()
        }
        .insert(db)
    })
    .await;

    match inserted {
        Ok(model) => {
            debug!(
                "Recorded webhook event {} ({} / {})",
                model.id, model.source, model.external_id
            );
            Ok((model, false))
        }
        Err(e) if is_unique_violation(&e) => {
            let existing = webhook_event::Entity::find()
                .filter(webhook_event::Column::Source.eq(event.source))
                .filter(webhook_event::Column::ExternalId.eq(event.external_id))
                .one(db)
                .await?
                .ok_or_else(|| NestogyError::internal("Duplicate webhook event vanished"))?;
            debug!(
                "Duplicate webhook event {} / {} ignored",
                event.source, event.external_id
            );
            Ok((existing, true))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn load_event(db: &DatabaseConnection, id: i32) -> Result<webhook_event::Model> {
    webhook_event::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| NestogyError::not_found(format!("Webhook event {} not found", id)))
}

/// 开始处理：attempts + 1
pub async fn begin_attempt(db: &DatabaseConnection, id: i32) -> Result<()> {
    webhook_event::Entity::update_many()
        .col_expr(
            webhook_event::Column::Attempts,
            Expr::col(webhook_event::Column::Attempts).add(1),
        )
        .filter(webhook_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn mark_processed(db: &DatabaseConnection, id: i32) -> Result<()> {
    webhook_event::Entity::update_many()
        .col_expr(
            webhook_event::Column::Status,
            Expr::value(WebhookEventStatus::Processed.to_string()),
        )
        .col_expr(webhook_event::Column::Error, Expr::value(Option::<String>::None))
        .col_expr(webhook_event::Column::ProcessedAt, Expr::value(Utc::now()))
        .filter(webhook_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn mark_failed(db: &DatabaseConnection, id: i32, error: &NestogyError) -> Result<()> {
    warn!("Webhook event {} failed: {}", id, error);
    webhook_event::Entity::update_many()
        .col_expr(
            webhook_event::Column::Status,
            Expr::value(WebhookEventStatus::Failed.to_string()),
        )
        .col_expr(webhook_event::Column::Error, Expr::value(Some(error.to_string())))
        .filter(webhook_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// 所有 pending 事件，按接收顺序
pub async fn pending_events(db: &DatabaseConnection) -> Result<Vec<webhook_event::Model>> {
    Ok(webhook_event::Entity::find()
        .filter(webhook_event::Column::Status.eq(WebhookEventStatus::Pending.as_ref()))
        .order_by_asc(webhook_event::Column::Id)
        .all(db)
        .await?)
}
