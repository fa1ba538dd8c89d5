//! Client rate cards and hourly-rate resolution

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, sea_query::Expr,
};
use serde::Deserialize;
use tracing::info;

use crate::config::get_config;
use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::services::TenantContext;
use crate::services::invoices::MAX_AMOUNT_CENTS;
use crate::storage::{SeaOrmStorage, TenantScoped, find_scoped};
use migration::entities::{client, rate_card};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateCardInput {
    pub client_id: Option<i32>,
    pub name: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

/// 客户的有效默认费率；没有则回退到配置值
pub fn pick_rate(cards: &[rate_card::Model], fallback_cents: i64) -> i64 {
    cards
        .iter()
        .filter(|c| c.is_default && c.is_active)
        .min_by_key(|c| c.id)
        .map(|c| c.hourly_rate_cents)
        .unwrap_or(fallback_cents)
}

/// 解析客户的小时费率（分）
pub async fn resolve_rate<C: ConnectionTrait>(db: &C, company_id: i32, client_id: i32) -> Result<i64> {
    let cards = rate_card::Entity::find_in_tenant(company_id)
        .filter(rate_card::Column::ClientId.eq(client_id))
        .filter(rate_card::Column::IsDefault.eq(true))
        .all(db)
        .await?;
    Ok(pick_rate(&cards, get_config().billing.default_hourly_rate_cents))
}

fn valid_rate(rate: i64) -> bool {
    (0..=MAX_AMOUNT_CENTS).contains(&rate)
}

fn rate_message() -> String {
    format!("must be between 0 and {}", MAX_AMOUNT_CENTS)
}

pub struct RateCardService {
    storage: Arc<SeaOrmStorage>,
}

impl RateCardService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list(&self, ctx: &TenantContext, client_id: Option<i32>) -> Result<Vec<rate_card::Model>> {
        let mut select = rate_card::Entity::find_in_tenant(ctx.company_id);
        if let Some(id) = client_id {
            select = select.filter(rate_card::Column::ClientId.eq(id));
        }
        Ok(select
            .order_by_asc(rate_card::Column::ClientId)
            .order_by_desc(rate_card::Column::IsDefault)
            .order_by_asc(rate_card::Column::Name)
            .all(self.storage.get_db())
            .await?)
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<rate_card::Model> {
        find_scoped::<rate_card::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    pub async fn create(&self, ctx: &TenantContext, input: RateCardInput) -> Result<rate_card::Model> {
        ctx.require_billing()?;
        let mut errors = FieldErrorsBuilder::new();
        let name = crate::utils::non_empty(input.name.clone());
        if name.is_none() {
            errors.add("name", "is required");
        }
        if input.client_id.is_none() {
            errors.add("client_id", "is required");
        }
        match input.hourly_rate_cents {
            Some(r) if !valid_rate(r) => errors.add("hourly_rate_cents", rate_message()),
            Some(_) => {}
            None => errors.add("hourly_rate_cents", "is required"),
        }
        errors.finish()?;

        let db = self.storage.get_db();
        let client_id = input.client_id.unwrap_or_default();
        client::Entity::find_in_tenant(ctx.company_id)
            .filter(client::Column::Id.eq(client_id))
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::invalid_field("client_id", "does not exist"))?;

        let is_default = input.is_default.unwrap_or(false);
        let now = Utc::now();
        let txn = self.storage.begin().await?;
        if is_default {
            clear_default(&txn, client_id, None).await?;
        }
        let created = rate_card::ActiveModel {
            company_id: Set(ctx.company_id),
            client_id: Set(client_id),
            name: Set(name.unwrap_or_default()),
            hourly_rate_cents: Set(input.hourly_rate_cents.unwrap_or_default()),
            is_default: Set(is_default),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!("RateCardService: created rate card {} for client {}", created.id, client_id);
        Ok(created)
    }

    /// 设为默认时同一事务内取消该客户其它卡片的默认标记
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: RateCardInput) -> Result<rate_card::Model> {
        ctx.require_billing()?;
        let existing = self.get(ctx, id).await?;

        let mut errors = FieldErrorsBuilder::new();
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.add("name", "is required");
        }
        if input.hourly_rate_cents.is_some_and(|r| !valid_rate(r)) {
            errors.add("hourly_rate_cents", rate_message());
        }
        if input.client_id.is_some_and(|c| c != existing.client_id) {
            errors.add("client_id", "cannot be changed on an existing rate card");
        }
        errors.finish()?;

        let client_id = existing.client_id;
        let txn = self.storage.begin().await?;
        if input.is_default == Some(true) {
            clear_default(&txn, client_id, Some(id)).await?;
        }
        let mut model: rate_card::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(rate) = input.hourly_rate_cents {
            model.hourly_rate_cents = Set(rate);
        }
        if let Some(d) = input.is_default {
            model.is_default = Set(d);
        }
        if let Some(a) = input.is_active {
            model.is_active = Set(a);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        Ok(updated)
    }

    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        ctx.require_billing()?;
        let existing = self.get(ctx, id).await?;
        existing.delete(self.storage.get_db()).await?;
        info!("RateCardService: deleted rate card {}", id);
        Ok(())
    }
}

async fn clear_default<C: ConnectionTrait>(db: &C, client_id: i32, except_id: Option<i32>) -> Result<()> {
    let mut update = rate_card::Entity::update_many()
        .col_expr(rate_card::Column::IsDefault, Expr::value(false))
        .filter(rate_card::Column::ClientId.eq(client_id))
        .filter(rate_card::Column::IsDefault.eq(true));
    if let Some(id) = except_id {
        update = update.filter(rate_card::Column::Id.ne(id));
    }
    update.exec(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: i32, rate: i64, is_default: bool, is_active: bool) -> rate_card::Model {
        let now = Utc::now();
        rate_card::Model {
            id,
            company_id: 1,
            client_id: 1,
            name: format!("Card {}", id),
            hourly_rate_cents: rate,
            is_default,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pick_rate_prefers_active_default() {
        let cards = vec![card(1, 9000, false, true), card(2, 12000, true, true)];
        assert_eq!(pick_rate(&cards, 15000), 12000);
    }

    #[test]
    fn test_inactive_default_falls_back() {
        let cards = vec![card(1, 9000, true, false)];
        assert_eq!(pick_rate(&cards, 15000), 15000);
        assert_eq!(pick_rate(&[], 15000), 15000);
    }
}
