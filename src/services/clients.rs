//! Client and contact management, plus CSV import/export

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{ClientStatus, parse_field};
use crate::services::TenantContext;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::csv_handler::{ImportMode, ImportReport, read_rows, write_rows};
use crate::utils::non_empty;
use crate::utils::url_validator::{is_plausible_email, validate_http_url};
use migration::entities::{asset, client, contact, invoice, ticket};

/// 客户创建/更新请求；更新时 None 表示保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFilter {
    /// 名称或邮箱包含
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub is_primary: Option<bool>,
}

/// CSV 列顺序：name,email,phone,website,address,city,state,postal_code,country,status,notes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCsvRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<&client::Model> for ClientCsvRow {
    fn from(c: &client::Model) -> Self {
        Self {
            name: c.name.clone(),
            email: c.email.clone(),
            phone: c.phone.clone(),
            website: c.website.clone(),
            address: c.address.clone(),
            city: c.city.clone(),
            state: c.state.clone(),
            postal_code: c.postal_code.clone(),
            country: c.country.clone(),
            status: Some(c.status.clone()),
            notes: c.notes.clone(),
        }
    }
}

impl From<ClientCsvRow> for ClientInput {
    fn from(row: ClientCsvRow) -> Self {
        Self {
            name: Some(row.name),
            email: row.email,
            phone: row.phone,
            website: row.website,
            address: row.address,
            city: row.city,
            state: row.state,
            postal_code: row.postal_code,
            country: row.country,
            status: row.status,
            notes: row.notes,
        }
    }
}

/// 校验后的客户字段
struct ValidClient {
    name: Option<String>,
    email: Option<Option<String>>,
    website: Option<Option<String>>,
    status: Option<ClientStatus>,
}

fn validate_client(input: &ClientInput, creating: bool) -> Result<ValidClient> {
    let mut errors = FieldErrorsBuilder::new();

    let name = match input.name.as_deref().map(str::trim) {
        Some("") => {
            errors.add("name", "is required");
            None
        }
        Some(n) if n.chars().count() > 255 => {
            errors.add("name", "may not be greater than 255 characters");
            None
        }
        Some(n) => Some(n.to_string()),
        None if creating => {
            errors.add("name", "is required");
            None
        }
        None => None,
    };

    let email = input.email.clone().map(|e| non_empty(Some(e)).map(|e| e.to_lowercase()));
    if let Some(Some(e)) = &email
        && !is_plausible_email(e)
    {
        errors.add("email", "must be a valid email address");
    }

    let website = input.website.clone().map(|w| non_empty(Some(w)));
    if let Some(Some(w)) = &website
        && let Err(e) = validate_http_url(w)
    {
        errors.add("website", e.to_string());
    }

    let status = match input.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => errors.capture("status", parse_field::<ClientStatus>("status", s)),
    };

    errors.finish()?;
    Ok(ValidClient {
        name,
        email,
        website,
        status,
    })
}

pub struct ClientService {
    storage: Arc<SeaOrmStorage>,
}

impl ClientService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &ClientFilter,
        page: &PageRequest,
    ) -> Result<Paginated<client::Model>> {
        let mut select = client::Entity::find_in_tenant(ctx.company_id);
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(client::Column::Name.contains(search))
                    .add(client::Column::Email.contains(search)),
            );
        }
        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let status = parse_field::<ClientStatus>("status", status)?;
            select = select.filter(client::Column::Status.eq(status.as_ref()));
        }
        let select = select.order_by_asc(client::Column::Name);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<client::Model> {
        find_scoped::<client::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    pub async fn create(&self, ctx: &TenantContext, input: ClientInput) -> Result<client::Model> {
        let created = insert_client(self.storage.get_db(), ctx.company_id, input).await?;
        info!("ClientService: created client {} '{}'", created.id, created.name);
        Ok(created)
    }

    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: i32,
        input: ClientInput,
    ) -> Result<client::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<client::Entity, _>(db, ctx.company_id, id).await?;
        let updated = apply_client_update(db, existing, input).await?;
        info!("ClientService: updated client {}", updated.id);
        Ok(updated)
    }

    /// 删除客户；仍有资产、工单或发票时拒绝
    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let existing = find_scoped::<client::Entity, _>(db, ctx.company_id, id).await?;

        let assets = asset::Entity::find_in_tenant(ctx.company_id)
            .filter(asset::Column::ClientId.eq(id))
            .count(db)
            .await?;
        let tickets = ticket::Entity::find_in_tenant(ctx.company_id)
            .filter(ticket::Column::ClientId.eq(id))
            .count(db)
            .await?;
        let invoices = invoice::Entity::find_in_tenant(ctx.company_id)
            .filter(invoice::Column::ClientId.eq(id))
            .count(db)
            .await?;
        if assets + tickets + invoices > 0 {
            return Err(NestogyError::validation(format!(
                "Client {} still has {} assets, {} tickets and {} invoices; set it inactive instead",
                id, assets, tickets, invoices
            )));
        }

        let txn = self.storage.begin().await?;
        contact::Entity::delete_many()
            .filter(contact::Column::ClientId.eq(id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!("ClientService: deleted client {}", id);
        Ok(())
    }

    // ============ Contacts ============

    pub async fn list_contacts(&self, ctx: &TenantContext, client_id: i32) -> Result<Vec<contact::Model>> {
        let db = self.storage.get_db();
        find_scoped::<client::Entity, _>(db, ctx.company_id, client_id).await?;
        Ok(contact::Entity::find_in_tenant(ctx.company_id)
            .filter(contact::Column::ClientId.eq(client_id))
            .order_by_desc(contact::Column::IsPrimary)
            .order_by_asc(contact::Column::Name)
            .all(db)
            .await?)
    }

    /// 新建联系人；设为主联系人时同一事务内清除其它联系人的标记
    pub async fn create_contact(
        &self,
        ctx: &TenantContext,
        client_id: i32,
        input: ContactInput,
    ) -> Result<contact::Model> {
        find_scoped::<client::Entity, _>(self.storage.get_db(), ctx.company_id, client_id).await?;
        let (name, email) = validate_contact(&input, true)?;
        let is_primary = input.is_primary.unwrap_or(false);
        let now = Utc::now();

        let txn = self.storage.begin().await?;
        if is_primary {
            clear_primary(&txn, client_id, None).await?;
        }
        let created = contact::ActiveModel {
            company_id: Set(ctx.company_id),
            client_id: Set(client_id),
            name: Set(name.unwrap_or_default()),
            email: Set(email.flatten()),
            phone: Set(non_empty(input.phone)),
            title: Set(non_empty(input.title)),
            is_primary: Set(is_primary),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        Ok(created)
    }

    pub async fn update_contact(
        &self,
        ctx: &TenantContext,
        client_id: i32,
        contact_id: i32,
        input: ContactInput,
    ) -> Result<contact::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<contact::Entity, _>(db, ctx.company_id, contact_id).await?;
        if existing.client_id != client_id {
            return Err(NestogyError::not_found(format!("Contact {} not found", contact_id)));
        }
        let (name, email) = validate_contact(&input, false)?;

        let txn = self.storage.begin().await?;
        if input.is_primary == Some(true) {
            clear_primary(&txn, client_id, Some(contact_id)).await?;
        }
        let mut model: contact::ActiveModel = existing.into();
        if let Some(name) = name {
            model.name = Set(name);
        }
        if let Some(email) = email {
            model.email = Set(email);
        }
        if let Some(phone) = input.phone {
            model.phone = Set(non_empty(Some(phone)));
        }
        if let Some(title) = input.title {
            model.title = Set(non_empty(Some(title)));
        }
        if let Some(primary) = input.is_primary {
            model.is_primary = Set(primary);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        Ok(updated)
    }

    pub async fn delete_contact(&self, ctx: &TenantContext, client_id: i32, contact_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let existing = find_scoped::<contact::Entity, _>(db, ctx.company_id, contact_id).await?;
        if existing.client_id != client_id {
            return Err(NestogyError::not_found(format!("Contact {} not found", contact_id)));
        }
        existing.delete(db).await?;
        Ok(())
    }

    // ============ CSV ============

    /// 导入客户 CSV，按名称匹配已有客户
    pub async fn import_csv(
        &self,
        ctx: &TenantContext,
        data: &[u8],
        mode: ImportMode,
    ) -> Result<ImportReport> {
        let db = self.storage.get_db();
        let mut report = ImportReport::default();

        for (row_num, parsed) in read_rows::<ClientCsvRow>(data) {
            let row = match parsed {
                Ok(row) => row,
                Err(e) => {
                    report.fail(row_num, e.to_string());
                    continue;
                }
            };
            let name = row.name.trim().to_string();
            if name.is_empty() {
                report.fail(row_num, "name is required");
                continue;
            }

            let existing = client::Entity::find_in_tenant(ctx.company_id)
                .filter(client::Column::Name.eq(name.as_str()))
                .one(db)
                .await?;

            let outcome = match (existing, mode) {
                (Some(_), ImportMode::Skip) => {
                    report.skipped += 1;
                    continue;
                }
                (Some(_), ImportMode::Error) => {
                    report.fail(row_num, format!("client '{}' already exists", name));
                    continue;
                }
                (Some(found), ImportMode::Overwrite) => {
                    apply_client_update(db, found, row.into()).await.map(|_| ())
                }
                (None, _) => insert_client(db, ctx.company_id, row.into()).await.map(|_| ()),
            };

            match outcome {
                Ok(()) => report.success += 1,
                Err(e) => report.fail(row_num, describe_row_error(&e)),
            }
        }

        info!(
            "ClientService: import finished ({} ok, {} skipped, {} failed)",
            report.success, report.skipped, report.failed
        );
        if report.failed > 0 {
            warn!("ClientService: import errors: {:?}", report.errors);
        }
        Ok(report)
    }

    pub async fn export_csv(&self, ctx: &TenantContext) -> Result<String> {
        let clients = client::Entity::find_in_tenant(ctx.company_id)
            .order_by_asc(client::Column::Name)
            .all(self.storage.get_db())
            .await?;
        let rows: Vec<ClientCsvRow> = clients.iter().map(ClientCsvRow::from).collect();
        write_rows(&rows)
    }
}

/// 把字段错误拼成一行，用于导入报告
pub(crate) fn describe_row_error(err: &NestogyError) -> String {
    match err.field_errors() {
        Some(fields) => fields
            .iter()
            .map(|(field, msgs)| format!("{} {}", field, msgs.join(", ")))
            .collect::<Vec<_>>()
            .join("; "),
        None => err.message().to_string(),
    }
}

async fn ensure_unique_name<C: ConnectionTrait>(
    db: &C,
    company_id: i32,
    name: &str,
    except_id: Option<i32>,
) -> Result<()> {
    let mut select = client::Entity::find_in_tenant(company_id).filter(client::Column::Name.eq(name));
    if let Some(id) = except_id {
        select = select.filter(client::Column::Id.ne(id));
    }
    if select.one(db).await?.is_some() {
        return Err(NestogyError::invalid_field("name", "has already been taken"));
    }
    Ok(())
}

async fn insert_client<C: ConnectionTrait>(
    db: &C,
    company_id: i32,
    input: ClientInput,
) -> Result<client::Model> {
    let valid = validate_client(&input, true)?;
    let name = valid.name.unwrap_or_default();
    ensure_unique_name(db, company_id, &name, None).await?;

    let now = Utc::now();
    Ok(client::ActiveModel {
        company_id: Set(company_id),
        name: Set(name),
        email: Set(valid.email.flatten()),
        phone: Set(non_empty(input.phone)),
        website: Set(valid.website.flatten()),
        address: Set(non_empty(input.address)),
        city: Set(non_empty(input.city)),
        state: Set(non_empty(input.state)),
        postal_code: Set(non_empty(input.postal_code)),
        country: Set(non_empty(input.country)),
        status: Set(valid.status.unwrap_or(ClientStatus::Active).to_string()),
        notes: Set(non_empty(input.notes)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

async fn apply_client_update<C: ConnectionTrait>(
    db: &C,
    existing: client::Model,
    input: ClientInput,
) -> Result<client::Model> {
    let valid = validate_client(&input, false)?;
    if let Some(name) = &valid.name {
        ensure_unique_name(db, existing.company_id, name, Some(existing.id)).await?;
    }

    let mut model: client::ActiveModel = existing.into();
    if let Some(name) = valid.name {
        model.name = Set(name);
    }
    if let Some(email) = valid.email {
        model.email = Set(email);
    }
    if let Some(website) = valid.website {
        model.website = Set(website);
    }
    if let Some(status) = valid.status {
        model.status = Set(status.to_string());
    }
    macro_rules! set_optional {
        ($($field:ident),+) => {
            $(
                if let Some(value) = input.$field {
                    model.$field = Set(non_empty(Some(value)));
                }
            )+
        };
    }
    set_optional!(phone, address, city, state, postal_code, country, notes);
    model.updated_at = Set(Utc::now());

    Ok(model.update(db).await?)
}

fn validate_contact(input: &ContactInput, creating: bool) -> Result<(Option<String>, Option<Option<String>>)> {
    let mut errors = FieldErrorsBuilder::new();
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
    let email = input.email.clone().map(|e| non_empty(Some(e)).map(|e| e.to_lowercase()));
    if let Some(Some(e)) = &email
        && !is_plausible_email(e)
    {
        errors.add("email", "must be a valid email address");
    }
    errors.finish()?;
    Ok((name, email))
}

async fn clear_primary<C: ConnectionTrait>(db: &C, client_id: i32, except_id: Option<i32>) -> Result<()> {
    let mut update = contact::Entity::update_many()
        .col_expr(contact::Column::IsPrimary, Expr::value(false))
        .filter(contact::Column::ClientId.eq(client_id))
        .filter(contact::Column::IsPrimary.eq(true));
    if let Some(id) = except_id {
        update = update.filter(contact::Column::Id.ne(id));
    }
    update.exec(db).await?;
    Ok(())
}
