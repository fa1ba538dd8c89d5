//! 员工打卡记录实体（用于薪资）

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "employee_time_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    pub user_id: i32,
    pub clock_in: DateTimeUtc,
    pub clock_out: Option<DateTimeUtc>,
    pub break_minutes: i32,
    pub total_minutes: Option<i32>,
    pub status: String,
    pub exported_to_payroll_at: Option<DateTimeUtc>,
    pub approved_by: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
