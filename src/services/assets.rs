//! Asset inventory

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{AssetStatus, AssetType, SupportStatus, parse_field};
use crate::services::TenantContext;
use crate::services::clients::describe_row_error;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::csv_handler::{ImportMode, ImportReport, read_rows, write_rows};
use crate::utils::non_empty;
use migration::entities::{asset, client, contract_asset, ticket};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetInput {
    pub client_id: Option<i32>,
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub serial_number: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFilter {
    pub client_id: Option<i32>,
    pub asset_type: Option<String>,
    pub support_status: Option<String>,
    pub status: Option<String>,
    /// 名称、主机名或序列号包含
    pub search: Option<String>,
}

/// CSV 列：name,asset_type,client,serial_number,hostname,ip_address,os,status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetCsvRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_type: String,
    /// 客户名称（租户内解析）
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

struct ValidAsset {
    name: Option<String>,
    asset_type: Option<AssetType>,
    ip_address: Option<Option<String>>,
    status: Option<AssetStatus>,
}

fn validate_asset(input: &AssetInput, creating: bool) -> Result<ValidAsset> {
    let mut errors = FieldErrorsBuilder::new();

    if creating && input.client_id.is_none() {
        errors.add("client_id", "is required");
    }

    let name = match input.name.as_deref().map(str::trim) {
        Some("") => {
            errors.add("name", "is required");
            None
        }
        Some(n) => Some(n.to_string()),
        None if creating => {
            errors.add("name", "is required");
            None
        }
        None => None,
    };

    let asset_type = match input.asset_type.as_deref() {
        Some(t) => errors.capture("asset_type", parse_field::<AssetType>("asset_type", t)),
        None if creating => {
            errors.add("asset_type", "is required");
            None
        }
        None => None,
    };

    let ip_address = input.ip_address.clone().map(|ip| non_empty(Some(ip)));
    if let Some(Some(ip)) = &ip_address
        && ip.parse::<IpAddr>().is_err()
    {
        errors.add("ip_address", "must be a valid IPv4 or IPv6 address");
    }

    let status = match input.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => errors.capture("status", parse_field::<AssetStatus>("status", s)),
    };

    errors.finish()?;
    Ok(ValidAsset {
        name,
        asset_type,
        ip_address,
        status,
    })
}

pub struct AssetService {
    storage: Arc<SeaOrmStorage>,
    events: Arc<EventBus>,
}

impl AssetService {
    pub fn new(storage: Arc<SeaOrmStorage>, events: Arc<EventBus>) -> Self {
        Self { storage, events }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &AssetFilter,
        page: &PageRequest,
    ) -> Result<Paginated<asset::Model>> {
        let mut select = asset::Entity::find_in_tenant(ctx.company_id);
        if let Some(client_id) = filter.client_id {
            select = select.filter(asset::Column::ClientId.eq(client_id));
        }
        if let Some(t) = filter.asset_type.as_deref().filter(|s| !s.is_empty()) {
            let t = parse_field::<AssetType>("asset_type", t)?;
            select = select.filter(asset::Column::AssetType.eq(t.as_ref()));
        }
        if let Some(s) = filter.support_status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<SupportStatus>("support_status", s)?;
            select = select.filter(asset::Column::SupportStatus.eq(s.as_ref()));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<AssetStatus>("status", s)?;
            select = select.filter(asset::Column::Status.eq(s.as_ref()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(asset::Column::Name.contains(search))
                    .add(asset::Column::Hostname.contains(search))
                    .add(asset::Column::SerialNumber.contains(search)),
            );
        }
        let select = select.order_by_asc(asset::Column::Name);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<asset::Model> {
        find_scoped::<asset::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    pub async fn create(&self, ctx: &TenantContext, input: AssetInput) -> Result<asset::Model> {
        let created = insert_asset(self.storage.get_db(), ctx.company_id, input).await?;
        info!("AssetService: created asset {} '{}'", created.id, created.name);

        self.events
            .publish(DomainEvent::AssetCreated {
                company_id: ctx.company_id,
                asset_id: created.id,
            })
            .await;
        Ok(created)
    }

    /// 更新资产；客户或类型变化时发布 AssetUpdated
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: AssetInput) -> Result<asset::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<asset::Entity, _>(db, ctx.company_id, id).await?;
        let (updated, coverage_changed) = apply_asset_update(db, existing, input).await?;
        info!("AssetService: updated asset {}", updated.id);

        if coverage_changed {
            self.events
                .publish(DomainEvent::AssetUpdated {
                    company_id: ctx.company_id,
                    asset_id: updated.id,
                })
                .await;
        }
        Ok(updated)
    }

    /// 删除资产，同时解除合同关联；工单上的资产引用置空
    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let existing = find_scoped::<asset::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;

        let txn = self.storage.begin().await?;
        contract_asset::Entity::delete_many()
            .filter(contract_asset::Column::AssetId.eq(id))
            .exec(&txn)
            .await?;
        ticket::Entity::update_many()
            .col_expr(ticket::Column::AssetId, sea_orm::sea_query::Expr::value(Option::<i32>::None))
            .filter(ticket::Column::AssetId.eq(id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!("AssetService: deleted asset {}", id);
        Ok(())
    }

    /// 导入资产 CSV；客户按名称解析，已有资产按 (客户, 名称) 匹配
    pub async fn import_csv(&self, ctx: &TenantContext, data: &[u8], mode: ImportMode) -> Result<ImportReport> {
        let db = self.storage.get_db();
        let mut report = ImportReport::default();
        let mut events = Vec::new();

        for (row_num, parsed) in read_rows::<AssetCsvRow>(data) {
            let row = match parsed {
                Ok(row) => row,
                Err(e) => {
                    report.fail(row_num, e.to_string());
                    continue;
                }
            };
            let client_name = row.client.trim();
            if client_name.is_empty() {
                report.fail(row_num, "client is required");
                continue;
            }
            let Some(owner) = client::Entity::find_in_tenant(ctx.company_id)
                .filter(client::Column::Name.eq(client_name))
                .one(db)
                .await?
            else {
                report.fail(row_num, format!("client '{}' not found", client_name));
                continue;
            };

            let input = AssetInput {
                client_id: Some(owner.id),
                name: Some(row.name.clone()),
                asset_type: Some(row.asset_type),
                serial_number: row.serial_number,
                hostname: row.hostname,
                ip_address: row.ip_address,
                os: row.os,
                status: row.status,
                notes: None,
            };

            let existing = asset::Entity::find_in_tenant(ctx.company_id)
                .filter(asset::Column::ClientId.eq(owner.id))
                .filter(asset::Column::Name.eq(row.name.trim()))
                .one(db)
                .await?;

            let outcome = match (existing, mode) {
                (Some(_), ImportMode::Skip) => {
                    report.skipped += 1;
                    continue;
                }
                (Some(found), ImportMode::Error) => {
                    report.fail(row_num, format!("asset '{}' already exists", found.name));
                    continue;
                }
                (Some(found), ImportMode::Overwrite) => {
                    apply_asset_update(db, found, input).await.map(|(a, changed)| {
                        changed.then_some(DomainEvent::AssetUpdated {
                            company_id: ctx.company_id,
                            asset_id: a.id,
                        })
                    })
                }
                (None, _) => insert_asset(db, ctx.company_id, input).await.map(|a| {
                    Some(DomainEvent::AssetCreated {
                        company_id: ctx.company_id,
                        asset_id: a.id,
                    })
                }),
            };

            match outcome {
                Ok(event) => {
                    report.success += 1;
                    events.extend(event);
                }
                Err(e) => report.fail(row_num, describe_row_error(&e)),
            }
        }

        for event in events {
            self.events.publish(event).await;
        }
        info!(
            "AssetService: import finished ({} ok, {} skipped, {} failed)",
            report.success, report.skipped, report.failed
        );
        Ok(report)
    }

    pub async fn export_csv(&self, ctx: &TenantContext) -> Result<String> {
        let db = self.storage.get_db();
        let clients = client::Entity::find_in_tenant(ctx.company_id).all(db).await?;
        let assets = asset::Entity::find_in_tenant(ctx.company_id)
            .order_by_asc(asset::Column::ClientId)
            .order_by_asc(asset::Column::Name)
            .all(db)
            .await?;

        let rows: Vec<AssetCsvRow> = assets
            .into_iter()
            .map(|a| AssetCsvRow {
                client: clients
                    .iter()
                    .find(|c| c.id == a.client_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default(),
                name: a.name,
                asset_type: a.asset_type,
                serial_number: a.serial_number,
                hostname: a.hostname,
                ip_address: a.ip_address,
                os: a.os,
                status: Some(a.status),
            })
            .collect();
        write_rows(&rows)
    }
}

async fn insert_asset<C: ConnectionTrait>(db: &C, company_id: i32, input: AssetInput) -> Result<asset::Model> {
    let valid = validate_asset(&input, true)?;
    let client_id = input.client_id.unwrap_or_default();
    ensure_client(db, company_id, client_id).await?;

    let now = Utc::now();
    Ok(asset::ActiveModel {
        company_id: Set(company_id),
        client_id: Set(client_id),
        name: Set(valid.name.unwrap_or_default()),
        asset_type: Set(valid.asset_type.unwrap_or(AssetType::Other).to_string()),
        serial_number: Set(non_empty(input.serial_number)),
        hostname: Set(non_empty(input.hostname)),
        ip_address: Set(valid.ip_address.flatten()),
        os: Set(non_empty(input.os)),
        status: Set(valid.status.unwrap_or(AssetStatus::Active).to_string()),
        support_status: Set(SupportStatus::Pending.to_string()),
        support_contract_id: Set(None),
        rmm_integration_id: Set(None),
        rmm_device_id: Set(None),
        last_seen_at: Set(None),
        notes: Set(non_empty(input.notes)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// 返回更新后的资产，以及客户或类型是否变化
async fn apply_asset_update<C: ConnectionTrait>(
    db: &C,
    existing: asset::Model,
    input: AssetInput,
) -> Result<(asset::Model, bool)> {
    let valid = validate_asset(&input, false)?;
    let mut changed = false;

    if let Some(client_id) = input.client_id
        && client_id != existing.client_id
    {
        ensure_client(db, existing.company_id, client_id).await?;
        changed = true;
    }
    if let Some(t) = valid.asset_type
        && t.as_ref() != existing.asset_type
    {
        changed = true;
    }

    let mut model: asset::ActiveModel = existing.into();
    if let Some(client_id) = input.client_id {
        model.client_id = Set(client_id);
    }
    if let Some(name) = valid.name {
        model.name = Set(name);
    }
    if let Some(t) = valid.asset_type {
        model.asset_type = Set(t.to_string());
    }
    if let Some(ip) = valid.ip_address {
        model.ip_address = Set(ip);
    }
    if let Some(status) = valid.status {
        model.status = Set(status.to_string());
    }
    if let Some(v) = input.serial_number {
        model.serial_number = Set(non_empty(Some(v)));
    }
    if let Some(v) = input.hostname {
        model.hostname = Set(non_empty(Some(v)));
    }
    if let Some(v) = input.os {
        model.os = Set(non_empty(Some(v)));
    }
    if let Some(v) = input.notes {
        model.notes = Set(non_empty(Some(v)));
    }
    model.updated_at = Set(Utc::now());

    Ok((model.update(db).await?, changed))
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
mod tests {
    use super::*;

    #[test]
    fn test_validate_asset_on_create() {
        let err = validate_asset(&AssetInput::default(), true).err().unwrap();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("client_id"));
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("asset_type"));
    }

    #[test]
    fn test_validate_asset_rejects_bad_values() {
        let input = AssetInput {
            asset_type: Some("toaster".into()),
            ip_address: Some("10.0.0.300".into()),
            ..Default::default()
        };
        let err = validate_asset(&input, false).err().unwrap();
        let fields = err.field_errors().unwrap();
        assert!(fields["asset_type"][0].starts_with("must be one of:"));
        assert!(fields.contains_key("ip_address"));
    }

    #[test]
    fn test_validate_asset_accepts_ipv6() {
        let input = AssetInput {
            ip_address: Some("fe80::1".into()),
            ..Default::default()
        };
        assert!(validate_asset(&input, false).is_ok());
    }
}
