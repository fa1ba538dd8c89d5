//! Asset support-status evaluation
//!
//! An asset is supported when an in-force contract of its client covers it.
//! Explicit attachments win over type coverage; ties go to the lowest id.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::debug;

use crate::errors::Result;
use crate::models::SupportStatus;
use crate::services::contracts::{covers, is_in_force};
use crate::storage::{SeaOrmStorage, TenantScoped};
use migration::entities::{asset, contract, contract_asset};

/// 选出为资产提供支持的合同
///
/// `contracts` 为该客户的全部合同，`attached` 为显式关联了该资产的合同 id。
pub fn choose_support_contract(
    contracts: &[contract::Model],
    attached: &[i32],
    asset_type: &str,
    today: NaiveDate,
) -> Option<i32> {
    let in_force = || contracts.iter().filter(|c| is_in_force(c, today));

    in_force()
        .filter(|c| attached.contains(&c.id))
        .map(|c| c.id)
        .min()
        .or_else(|| {
            in_force()
                .filter(|c| covers(c, asset_type))
                .map(|c| c.id)
                .min()
        })
}

pub struct SupportEvaluator {
    storage: Arc<SeaOrmStorage>,
}

impl SupportEvaluator {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 重新计算单个资产；返回新的支持状态（资产不存在时返回 None）
    pub async fn evaluate_asset(
        &self,
        company_id: i32,
        asset_id: i32,
        today: NaiveDate,
    ) -> Result<Option<SupportStatus>> {
        let db = self.storage.get_db();
        let Some(target) = asset::Entity::find_in_tenant(company_id)
            .filter(asset::Column::Id.eq(asset_id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let contracts = self.client_contracts(company_id, target.client_id).await?;
        let (status, _) = self.apply(target, &contracts, today).await?;
        Ok(Some(status))
    }

    /// 重新计算客户的全部资产，返回被修改的资产数
    pub async fn evaluate_client(&self, company_id: i32, client_id: i32, today: NaiveDate) -> Result<usize> {
        let db = self.storage.get_db();
        let contracts = self.client_contracts(company_id, client_id).await?;
        let assets = asset::Entity::find_in_tenant(company_id)
            .filter(asset::Column::ClientId.eq(client_id))
            .order_by_asc(asset::Column::Id)
            .all(db)
            .await?;

        let mut changed = 0;
        for a in assets {
            if self.apply(a, &contracts, today).await?.1 {
                changed += 1;
            }
        }
        debug!(
            "SupportEvaluator: client {} re-evaluated, {} assets changed",
            client_id, changed
        );
        Ok(changed)
    }

    async fn client_contracts(&self, company_id: i32, client_id: i32) -> Result<Vec<contract::Model>> {
        Ok(contract::Entity::find_in_tenant(company_id)
            .filter(contract::Column::ClientId.eq(client_id))
            .all(self.storage.get_db())
            .await?)
    }

    async fn attached_contracts(&self, asset_id: i32) -> Result<Vec<i32>> {
        Ok(contract_asset::Entity::find()
            .select_only()
            .column(contract_asset::Column::ContractId)
            .filter(contract_asset::Column::AssetId.eq(asset_id))
            .into_tuple::<i32>()
            .all(self.storage.get_db())
            .await?)
    }

    /// 写回支持状态，返回 (状态, 是否有变化)
    async fn apply(
        &self,
        target: asset::Model,
        contracts: &[contract::Model],
        today: NaiveDate,
    ) -> Result<(SupportStatus, bool)> {
        let attached = self.attached_contracts(target.id).await?;
        let chosen = choose_support_contract(contracts, &attached, &target.asset_type, today);
        let status = if chosen.is_some() {
            SupportStatus::Supported
        } else {
            SupportStatus::Unsupported
        };

        let changed = target.support_status != status.as_ref() || target.support_contract_id != chosen;
        if changed {
            let asset_id = target.id;
            let mut model: asset::ActiveModel = target.into();
            model.support_status = Set(status.to_string());
            model.support_contract_id = Set(chosen);
            model.updated_at = Set(Utc::now());
            model.update(self.storage.get_db()).await?;
            debug!(
                "SupportEvaluator: asset {} is now {} (contract {:?})",
                asset_id, status, chosen
            );
        }
        Ok((status, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractStatus;
    use crate::services::contracts::tests::contract;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_contracts_is_unsupported() {
        assert_eq!(choose_support_contract(&[], &[], "server", day("2026-05-01")), None);
    }

    #[test]
    fn test_lowest_covering_contract_wins() {
        let contracts = vec![
            contract(7, ContractStatus::Active, "2026-01-01", None, &["server"]),
            contract(3, ContractStatus::Active, "2026-01-01", None, &[]),
            contract(2, ContractStatus::Active, "2026-01-01", None, &["laptop"]),
        ];
        assert_eq!(
            choose_support_contract(&contracts, &[], "server", day("2026-05-01")),
            Some(3)
        );
    }

    #[test]
    fn test_explicit_attachment_beats_lower_id() {
        let contracts = vec![
            contract(1, ContractStatus::Active, "2026-01-01", None, &[]),
            contract(5, ContractStatus::Active, "2026-01-01", None, &["printer"]),
        ];
        // 显式关联即使类型不覆盖也算支持
        assert_eq!(
            choose_support_contract(&contracts, &[5], "server", day("2026-05-01")),
            Some(5)
        );
    }

    #[test]
    fn test_attachment_to_contract_not_in_force_is_ignored() {
        let contracts = vec![
            contract(1, ContractStatus::Expired, "2025-01-01", Some("2025-12-31"), &[]),
            contract(2, ContractStatus::Active, "2026-01-01", None, &["laptop"]),
        ];
        assert_eq!(
            choose_support_contract(&contracts, &[1], "server", day("2026-05-01")),
            None
        );
        assert_eq!(
            choose_support_contract(&contracts, &[1], "laptop", day("2026-05-01")),
            Some(2)
        );
    }
}
