//! RMM 集成配置实体

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "rmm_integrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    #[sea_orm(unique)]
    pub uuid: String,
    pub name: String,
    pub vendor: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub default_client_id: Option<i32>,
    pub auto_create_assets: bool,
    pub ticket_min_severity: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub field_mappings: Option<String>,
    pub is_active: bool,
    pub last_received_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
