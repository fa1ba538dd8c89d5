//! 工单工时（可计费时间）实体

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "time_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    pub user_id: i32,
    pub client_id: i32,
    pub ticket_id: Option<i32>,
    pub work_date: Date,
    pub minutes: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub billable: bool,
    pub status: String,
    pub invoice_id: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
