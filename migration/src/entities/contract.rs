use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "contracts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    pub client_id: i32,
    pub name: String,
    pub status: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub monthly_value_cents: i64,
    /// JSON 数组，空数组表示覆盖所有资产类型
    #[sea_orm(column_type = "Text")]
    pub covered_asset_types: String,
    pub auto_assign_assets: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
