//! 客户资产实体（工作站、服务器、网络设备等）

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    pub client_id: i32,
    pub name: String,
    pub asset_type: String,
    pub serial_number: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub status: String,
    pub support_status: String,
    pub support_contract_id: Option<i32>,
    pub rmm_integration_id: Option<i32>,
    pub rmm_device_id: Option<String>,
    pub last_seen_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
