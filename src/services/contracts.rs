//! Service contracts and explicit asset coverage

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{AssetType, ContractStatus, parse_field};
use crate::services::TenantContext;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::non_empty;
use migration::entities::{asset, client, contract, contract_asset};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractInput {
    pub client_id: Option<i32>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    /// 空字符串表示不限期
    pub end_date: Option<String>,
    pub monthly_value_cents: Option<i64>,
    pub covered_asset_types: Option<Vec<String>>,
    pub auto_assign_assets: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractFilter {
    pub client_id: Option<i32>,
    pub status: Option<String>,
}

/// 合同在日期 `on` 是否生效
pub fn is_in_force(contract: &contract::Model, on: NaiveDate) -> bool {
    contract.status == ContractStatus::Active.as_ref()
        && contract.start_date <= on
        && contract.end_date.is_none_or(|end| on <= end)
}

/// 覆盖的资产类型；列为空表示覆盖全部
pub fn covered_types(contract: &contract::Model) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(&contract.covered_asset_types).unwrap_or_default()
}

pub fn covers(contract: &contract::Model, asset_type: &str) -> bool {
    let types = covered_types(contract);
    types.is_empty() || types.iter().any(|t| t.eq_ignore_ascii_case(asset_type))
}

fn parse_end_date(raw: &str) -> Result<Option<NaiveDate>> {
    match raw.trim() {
        "" => Ok(None),
        s => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| NestogyError::invalid_field("end_date", "must be a date in YYYY-MM-DD format")),
    }
}

fn normalize_types(raw: &[String], errors: &mut FieldErrorsBuilder) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for t in raw {
        if let Some(parsed) = errors.capture(
            "covered_asset_types",
            parse_field::<AssetType>("covered_asset_types", t),
        ) {
            let value = parsed.to_string();
            if !types.contains(&value) {
                types.push(value);
            }
        }
    }
    types
}

pub struct ContractService {
    storage: Arc<SeaOrmStorage>,
    events: Arc<EventBus>,
}

impl ContractService {
    pub fn new(storage: Arc<SeaOrmStorage>, events: Arc<EventBus>) -> Self {
        Self { storage, events }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &ContractFilter,
        page: &PageRequest,
    ) -> Result<Paginated<contract::Model>> {
        let mut select = contract::Entity::find_in_tenant(ctx.company_id);
        if let Some(client_id) = filter.client_id {
            select = select.filter(contract::Column::ClientId.eq(client_id));
        }
        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let status = parse_field::<ContractStatus>("status", status)?;
            select = select.filter(contract::Column::Status.eq(status.as_ref()));
        }
        let select = select.order_by_desc(contract::Column::StartDate);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<contract::Model> {
        find_scoped::<contract::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    pub async fn create(&self, ctx: &TenantContext, input: ContractInput) -> Result<contract::Model> {
        let db = self.storage.get_db();
        let mut errors = FieldErrorsBuilder::new();

        let name = non_empty(input.name.clone());
        if name.is_none() {
            errors.add("name", "is required");
        }
        if input.client_id.is_none() {
            errors.add("client_id", "is required");
        }
        if input.start_date.is_none() {
            errors.add("start_date", "is required");
        }
        let end_date = input
            .end_date
            .as_deref()
            .and_then(|raw| errors.capture("end_date", parse_end_date(raw)))
            .flatten();
        let status = match input.status.as_deref() {
            Some(s) => errors.capture("status", parse_field::<ContractStatus>("status", s)),
            None => Some(ContractStatus::Draft),
        };
        if let Some(s) = status
            && !matches!(s, ContractStatus::Draft | ContractStatus::Active)
        {
            errors.add("status", "a new contract must be draft or active");
        }
        let types = normalize_types(input.covered_asset_types.as_deref().unwrap_or(&[]), &mut errors);
        let monthly = input.monthly_value_cents.unwrap_or(0);
        if monthly < 0 {
            errors.add("monthly_value_cents", "must be at least 0");
        }
        if let (Some(start), Some(end)) = (input.start_date, end_date)
            && end < start
        {
            errors.add("end_date", "must be a date after or equal to start_date");
        }
        errors.finish()?;

        let client_id = input.client_id.unwrap_or_default();
        ensure_client(db, ctx.company_id, client_id).await?;

        let now = Utc::now();
        let created = contract::ActiveModel {
            company_id: Set(ctx.company_id),
            client_id: Set(client_id),
            name: Set(name.unwrap_or_default()),
            status: Set(status.unwrap_or(ContractStatus::Draft).to_string()),
            start_date: Set(input.start_date.unwrap_or_default()),
            end_date: Set(end_date),
            monthly_value_cents: Set(monthly),
            covered_asset_types: Set(serde_json::to_string(&types)?),
            auto_assign_assets: Set(input.auto_assign_assets.unwrap_or(false)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!("ContractService: created contract {} for client {}", created.id, client_id);
        self.publish_changed(&created).await;
        Ok(created)
    }

    /// 更新合同；状态只能按允许的流转变化
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: ContractInput) -> Result<contract::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<contract::Entity, _>(db, ctx.company_id, id).await?;
        let mut errors = FieldErrorsBuilder::new();

        let current = parse_field::<ContractStatus>("status", &existing.status)?;
        let status = input
            .status
            .as_deref()
            .and_then(|s| errors.capture("status", parse_field::<ContractStatus>("status", s)));
        if let Some(next) = status
            && next != current
            && !current.can_transition_to(next)
        {
            errors.add(
                "status",
                format!("cannot change status from {} to {}", current, next),
            );
        }

        let name = input.name.as_deref().map(str::trim);
        if name == Some("") {
            errors.add("name", "is required");
        }
        let end_date = match input.end_date.as_deref() {
            Some(raw) => errors.capture("end_date", parse_end_date(raw)),
            None => Some(existing.end_date),
        };
        let start = input.start_date.unwrap_or(existing.start_date);
        if let Some(Some(end)) = end_date
            && end < start
        {
            errors.add("end_date", "must be a date after or equal to start_date");
        }
        let types = input
            .covered_asset_types
            .as_deref()
            .map(|raw| normalize_types(raw, &mut errors));
        if input.monthly_value_cents.is_some_and(|v| v < 0) {
            errors.add("monthly_value_cents", "must be at least 0");
        }
        errors.finish()?;

        if let Some(client_id) = input.client_id
            && client_id != existing.client_id
        {
            return Err(NestogyError::invalid_field(
                "client_id",
                "cannot be changed on an existing contract",
            ));
        }

        let mut model: contract::ActiveModel = existing.into();
        if let Some(name) = name {
            model.name = Set(name.to_string());
        }
        if let Some(next) = status {
            model.status = Set(next.to_string());
        }
        model.start_date = Set(start);
        if let Some(end) = end_date {
            model.end_date = Set(end);
        }
        if let Some(v) = input.monthly_value_cents {
            model.monthly_value_cents = Set(v);
        }
        if let Some(types) = types {
            model.covered_asset_types = Set(serde_json::to_string(&types)?);
        }
        if let Some(auto) = input.auto_assign_assets {
            model.auto_assign_assets = Set(auto);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;

        info!("ContractService: updated contract {} ({})", updated.id, updated.status);
        self.publish_changed(&updated).await;
        Ok(updated)
    }

    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let existing = find_scoped::<contract::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        if existing.status == ContractStatus::Active.as_ref() {
            return Err(NestogyError::validation(
                "Active contracts cannot be deleted; terminate the contract first",
            ));
        }

        let txn = self.storage.begin().await?;
        contract_asset::Entity::delete_many()
            .filter(contract_asset::Column::ContractId.eq(id))
            .exec(&txn)
            .await?;
        let snapshot = existing.clone();
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!("ContractService: deleted contract {}", id);
        self.publish_changed(&snapshot).await;
        Ok(())
    }

    pub async fn list_assets(&self, ctx: &TenantContext, id: i32) -> Result<Vec<asset::Model>> {
        let db = self.storage.get_db();
        find_scoped::<contract::Entity, _>(db, ctx.company_id, id).await?;
        let asset_ids = attached_asset_ids(db, id).await?;
        Ok(asset::Entity::find_in_tenant(ctx.company_id)
            .filter(asset::Column::Id.is_in(asset_ids))
            .order_by_asc(asset::Column::Name)
            .all(db)
            .await?)
    }

    /// 显式关联资产（幂等）
    pub async fn attach_asset(&self, ctx: &TenantContext, contract_id: i32, asset_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let found = find_scoped::<contract::Entity, _>(db, ctx.company_id, contract_id).await?;
        let target = find_scoped::<asset::Entity, _>(db, ctx.company_id, asset_id).await?;
        if target.client_id != found.client_id {
            return Err(NestogyError::invalid_field(
                "asset_id",
                "asset belongs to a different client than the contract",
            ));
        }

        if link_asset(db, contract_id, asset_id).await? {
            info!("ContractService: attached asset {} to contract {}", asset_id, contract_id);
            self.publish_changed(&found).await;
        }
        Ok(())
    }

    pub async fn detach_asset(&self, ctx: &TenantContext, contract_id: i32, asset_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let found = find_scoped::<contract::Entity, _>(db, ctx.company_id, contract_id).await?;
        let result = contract_asset::Entity::delete_many()
            .filter(contract_asset::Column::ContractId.eq(contract_id))
            .filter(contract_asset::Column::AssetId.eq(asset_id))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(NestogyError::not_found(format!(
                "Asset {} is not attached to contract {}",
                asset_id, contract_id
            )));
        }

        info!("ContractService: detached asset {} from contract {}", asset_id, contract_id);
        self.publish_changed(&found).await;
        Ok(())
    }

    /// 把新资产关联到客户所有生效、自动关联且覆盖该类型的合同，返回关联的合同 id
    pub async fn auto_attach_asset(&self, company_id: i32, asset_id: i32, today: NaiveDate) -> Result<Vec<i32>> {
        let db = self.storage.get_db();
        let Some(target) = asset::Entity::find_in_tenant(company_id)
            .filter(asset::Column::Id.eq(asset_id))
            .one(db)
            .await?
        else {
            debug!("ContractService: asset {} vanished before auto-assignment", asset_id);
            return Ok(Vec::new());
        };

        let candidates = contract::Entity::find_in_tenant(company_id)
            .filter(contract::Column::ClientId.eq(target.client_id))
            .filter(contract::Column::AutoAssignAssets.eq(true))
            .order_by_asc(contract::Column::Id)
            .all(db)
            .await?;

        let mut attached = Vec::new();
        for c in candidates
            .iter()
            .filter(|c| is_in_force(c, today) && covers(c, &target.asset_type))
        {
            if link_asset(db, c.id, target.id).await? {
                attached.push(c.id);
            }
        }
        if !attached.is_empty() {
            info!(
                "ContractService: auto-assigned asset {} to contracts {:?}",
                asset_id, attached
            );
        }
        Ok(attached)
    }

    /// 把已过结束日期的 active 合同置为 expired
    pub async fn expire_ended(&self, today: NaiveDate) -> Result<Vec<contract::Model>> {
        let db = self.storage.get_db();
        let ended = contract::Entity::find()
            .filter(contract::Column::Status.eq(ContractStatus::Active.as_ref()))
            .filter(contract::Column::EndDate.lt(today))
            .all(db)
            .await?;

        let mut expired = Vec::with_capacity(ended.len());
        for c in ended {
            let mut model: contract::ActiveModel = c.into();
            model.status = Set(ContractStatus::Expired.to_string());
            model.updated_at = Set(Utc::now());
            let updated = model.update(db).await?;
            self.publish_changed(&updated).await;
            expired.push(updated);
        }
        if !expired.is_empty() {
            info!("ContractService: expired {} contracts", expired.len());
        }
        Ok(expired)
    }

    async fn publish_changed(&self, c: &contract::Model) {
        self.events
            .publish(DomainEvent::ContractChanged {
                company_id: c.company_id,
                contract_id: c.id,
                client_id: c.client_id,
            })
            .await;
    }
}

pub(crate) async fn attached_asset_ids<C: ConnectionTrait>(db: &C, contract_id: i32) -> Result<Vec<i32>> {
    Ok(contract_asset::Entity::find()
        .select_only()
        .column(contract_asset::Column::AssetId)
        .filter(contract_asset::Column::ContractId.eq(contract_id))
        .into_tuple::<i32>()
        .all(db)
        .await?)
}

/// 插入关联；已存在时返回 false
async fn link_asset<C: ConnectionTrait>(db: &C, contract_id: i32, asset_id: i32) -> Result<bool> {
    let exists = contract_asset::Entity::find()
        .filter(contract_asset::Column::ContractId.eq(contract_id))
        .filter(contract_asset::Column::AssetId.eq(asset_id))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Ok(false);
    }

    let inserted = contract_asset::ActiveModel {
        contract_id: Set(contract_id),
        asset_id: Set(asset_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await;
    match inserted {
        Ok(_) => Ok(true),
        // 并发插入同一对时以唯一索引为准
        Err(e) if crate::storage::is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_client<C: ConnectionTrait>(db: &C, company_id: i32, client_id: i32) -> Result<()> {
    let exists = client::Entity::find_in_tenant(company_id)
        .filter(client::Column::Id.eq(client_id))
        .one(db)
        .await?
        .is_some();
    if !exists {
        return Err(NestogyError::invalid_field("client_id", "does not exist"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn contract(
        id: i32,
        status: ContractStatus,
        start: &str,
        end: Option<&str>,
        types: &[&str],
    ) -> contract::Model {
        let now = Utc::now();
        contract::Model {
            id,
            company_id: 1,
            client_id: 1,
            name: format!("Contract {}", id),
            status: status.to_string(),
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            monthly_value_cents: 0,
            covered_asset_types: serde_json::to_string(types).unwrap(),
            auto_assign_assets: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_in_force_window() {
        let c = contract(1, ContractStatus::Active, "2026-01-01", Some("2026-12-31"), &[]);
        assert!(is_in_force(&c, day("2026-01-01")));
        assert!(is_in_force(&c, day("2026-12-31")));
        assert!(!is_in_force(&c, day("2025-12-31")));
        assert!(!is_in_force(&c, day("2027-01-01")));
    }

    #[test]
    fn test_open_ended_and_inactive() {
        let open = contract(1, ContractStatus::Active, "2026-01-01", None, &[]);
        assert!(is_in_force(&open, day("2040-06-01")));

        let draft = contract(2, ContractStatus::Draft, "2026-01-01", None, &[]);
        assert!(!is_in_force(&draft, day("2026-06-01")));
    }

    #[test]
    fn test_covers() {
        let all = contract(1, ContractStatus::Active, "2026-01-01", None, &[]);
        assert!(covers(&all, "printer"));

        let servers = contract(2, ContractStatus::Active, "2026-01-01", None, &["server", "network"]);
        assert!(covers(&servers, "server"));
        assert!(!covers(&servers, "laptop"));
    }

    #[test]
    fn test_parse_end_date() {
        assert_eq!(parse_end_date("").unwrap(), None);
        assert_eq!(parse_end_date("2026-03-31").unwrap(), Some(day("2026-03-31")));
        assert!(parse_end_date("31/03/2026").is_err());
    }

    #[test]
    fn test_normalize_types_dedups_and_validates() {
        let mut errors = FieldErrorsBuilder::new();
        let types = normalize_types(
            &["Server".into(), "server".into(), "laptop".into()],
            &mut errors,
        );
        assert_eq!(types, vec!["server".to_string(), "laptop".to_string()]);
        assert!(errors.is_empty());

        normalize_types(&["toaster".into()], &mut errors);
        assert!(!errors.is_empty());
    }
}
