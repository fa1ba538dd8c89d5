//! 租户隔离的查询辅助
//!
//! 所有代表请求方执行的查询都带上 `company_id` 条件，
//! 其它租户的记录一律表现为“不存在”。

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, PaginatorTrait, PrimaryKeyTrait,
    QueryFilter, Select,
};

use crate::errors::{NestogyError, Result};
use crate::storage::models::{PageRequest, Paginated};
use migration::entities::{
    asset, client, contact, contract, email_account, employee_time_entry, invoice, kb_article,
    physical_mail_order, rate_card, rmm_integration, ticket, time_entry, user,
};

/// 带 `company_id` 列的实体
pub trait TenantScoped: EntityTrait {
    fn tenant_column() -> Self::Column;

    /// 404 消息中使用的资源名
    fn resource_name() -> &'static str;

    fn find_in_tenant(company_id: i32) -> Select<Self> {
        Self::find().filter(Self::tenant_column().eq(company_id))
    }
}

macro_rules! tenant_scoped {
    ($($module:ident => $name:literal),+ $(,)?) => {
        $(
            impl TenantScoped for $module::Entity {
                fn tenant_column() -> Self::Column {
                    $module::Column::CompanyId
                }

                fn resource_name() -> &'static str {
                    $name
                }
            }
        )+
    };
}

tenant_scoped!(
    asset => "Asset",
    client => "Client",
    contact => "Contact",
    contract => "Contract",
    email_account => "Email account",
    employee_time_entry => "Time clock entry",
    invoice => "Invoice",
    kb_article => "Article",
    physical_mail_order => "Mail order",
    rate_card => "Rate card",
    rmm_integration => "Integration",
    ticket => "Ticket",
    time_entry => "Time entry",
    user => "User",
);

/// 按主键查找租户内记录，不存在或属于其它租户时返回 NotFound
pub async fn find_scoped<E, C>(db: &C, company_id: i32, id: i32) -> Result<E::Model>
where
    E: TenantScoped,
    C: ConnectionTrait,
    <E::PrimaryKey as PrimaryKeyTrait>::ValueType: From<i32>,
{
    E::find_by_id(id)
        .filter(E::tenant_column().eq(company_id))
        .one(db)
        .await?
        .ok_or_else(|| NestogyError::not_found(format!("{} {} not found", E::resource_name(), id)))
}

/// 对任意查询执行分页（先 COUNT 再取页）
pub async fn paginate<'db, E, C>(
    db: &'db C,
    select: Select<E>,
    request: &PageRequest,
) -> Result<Paginated<E::Model>>
where
    E: EntityTrait,
    C: ConnectionTrait,
    E::Model: FromQueryResult + Sized + Send + Sync + 'db,
{
    let paginator = select.paginate(db, request.page_size());
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.page() - 1).await?;
    Ok(Paginated::new(items, total, request))
}
