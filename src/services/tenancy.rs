//! Tenancy, authentication and user management
//!
//! Every service call receives a [`TenantContext`] explicitly; nothing reads
//! the "current user" from ambient state.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{Role, parse_field};
use crate::storage::{SeaOrmStorage, TenantScoped, find_scoped};
use crate::utils::password::{hash_password, verify_password};
use crate::utils::url_validator::is_plausible_email;
use migration::entities::{company, user};

/// 请求级租户上下文（由 Bearer JWT 解析而来）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub company_id: i32,
    pub user_id: i32,
    pub role: Role,
}

impl TenantContext {
    pub fn new(company_id: i32, user_id: i32, role: Role) -> Self {
        Self {
            company_id,
            user_id,
            role,
        }
    }

    /// 角色不在允许列表内时返回 403
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(NestogyError::forbidden(format!(
                "This action requires one of the roles: {}",
                allowed
                    .iter()
                    .map(|r| r.as_ref())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    /// 计费相关写操作：admin 或 accountant
    pub fn require_billing(&self) -> Result<()> {
        self.require_role(&[Role::Admin, Role::Accountant])
    }

    pub fn require_admin(&self) -> Result<()> {
        self.require_role(&[Role::Admin])
    }
}

/// 新建租户（CLI 引导用）
#[derive(Debug, Clone)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub currency: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

/// 登录成功后的用户与租户
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: user::Model,
    pub company: company::Model,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn context(&self) -> TenantContext {
        TenantContext::new(self.company.id, self.user.id, self.role)
    }
}

pub struct AuthService {
    storage: Arc<SeaOrmStorage>,
}

impl AuthService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 校验邮箱和密码
    ///
    /// 邮箱不存在与密码错误返回同一条 401 消息；
    /// 已停用的用户或租户返回 403。
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthenticatedUser> {
        let db = self.storage.get_db();
        let email = email.trim().to_lowercase();

        let Some(found) = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(db)
            .await?
        else {
            return Err(NestogyError::unauthorized("Invalid credentials"));
        };

        if !verify_password(password, &found.password_hash)? {
            warn!("AuthService: failed login for user {}", found.id);
            return Err(NestogyError::unauthorized("Invalid credentials"));
        }

        if !found.is_active {
            return Err(NestogyError::forbidden("User account is inactive"));
        }

        let company = company::Entity::find_by_id(found.company_id)
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::forbidden("Company not found"))?;
        if !company.is_active {
            return Err(NestogyError::forbidden("Company account is inactive"));
        }

        let role = parse_field::<Role>("role", &found.role)?;
        info!("AuthService: user {} logged in", found.id);
        Ok(AuthenticatedUser {
            user: found,
            company,
            role,
        })
    }

    /// 按库中当前状态确认 token 对应的用户：停用的用户或租户返回 401，角色以库中为准
    pub async fn refresh_context(&self, claimed: TenantContext) -> Result<TenantContext> {
        let db = self.storage.get_db();
        let rejected = || NestogyError::unauthorized("Unauthenticated.");

        let found = user::Entity::find_by_id(claimed.user_id)
            .filter(user::Column::CompanyId.eq(claimed.company_id))
            .one(db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(rejected)?;
        company::Entity::find_by_id(claimed.company_id)
            .one(db)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(rejected)?;

        let role = parse_field::<Role>("role", &found.role)?;
        if role != claimed.role {
            debug!(
                "AuthService: role of user {} changed from {} to {}",
                found.id, claimed.role, role
            );
        }
        Ok(TenantContext::new(claimed.company_id, found.id, role))
    }

    pub async fn current_user(&self, ctx: &TenantContext) -> Result<user::Model> {
        find_scoped::<user::Entity, _>(self.storage.get_db(), ctx.company_id, ctx.user_id).await
    }

    /// CLI 以租户的首个启用管理员身份执行命令
    pub async fn admin_context(&self, company_id: i32) -> Result<TenantContext> {
        let db = self.storage.get_db();
        let company = company::Entity::find_by_id(company_id)
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::not_found(format!("Company {} not found", company_id)))?;
        if !company.is_active {
            return Err(NestogyError::forbidden("Company is deactivated"));
        }

        let admin = user::Entity::find_in_tenant(company_id)
            .filter(user::Column::Role.eq(Role::Admin.as_ref()))
            .filter(user::Column::IsActive.eq(true))
            .order_by_asc(user::Column::Id)
            .one(db)
            .await?
            .ok_or_else(|| {
                NestogyError::not_found(format!("Company {} has no active admin", company_id))
            })?;
        Ok(TenantContext::new(company_id, admin.id, Role::Admin))
    }

    /// 创建租户及其首个管理员（单个事务）
    pub async fn create_company(
        &self,
        req: CreateCompanyRequest,
    ) -> Result<(company::Model, user::Model)> {
        let mut errors = FieldErrorsBuilder::new();
        let name = req.name.trim().to_string();
        if name.is_empty() {
            errors.add("name", "is required");
        }
        let currency = req.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.add("currency", "must be a 3-letter ISO code");
        }
        let email = req.admin_email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            errors.add("email", "must be a valid email address");
        }
        errors.finish()?;

        let db = self.storage.get_db();
        if company::Entity::find()
            .filter(company::Column::Name.eq(name.as_str()))
            .one(db)
            .await?
            .is_some()
        {
            return Err(NestogyError::invalid_field("name", "has already been taken"));
        }
        self.ensure_email_free(&email).await?;
        let password_hash = hash_password(&req.admin_password)?;

        let now = Utc::now();
        let txn = self.storage.begin().await?;
        let company = company::ActiveModel {
            name: Set(name),
            currency: Set(currency),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let admin = user::ActiveModel {
            company_id: Set(company.id),
            name: Set(req.admin_name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(Role::Admin.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(
            "AuthService: created company '{}' (id {}) with admin {}",
            company.name, company.id, admin.id
        );
        Ok((company, admin))
    }

    pub async fn list_users(&self, ctx: &TenantContext) -> Result<Vec<user::Model>> {
        Ok(user::Entity::find_in_tenant(ctx.company_id)
            .order_by_asc(user::Column::Name)
            .all(self.storage.get_db())
            .await?)
    }

    /// 新建用户（仅 admin）
    pub async fn create_user(&self, ctx: &TenantContext, req: CreateUserRequest) -> Result<user::Model> {
        ctx.require_admin()?;

        let mut errors = FieldErrorsBuilder::new();
        let name = req.name.trim().to_string();
        if name.is_empty() {
            errors.add("name", "is required");
        }
        let email = req.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            errors.add("email", "must be a valid email address");
        }
        let role = errors.capture("role", parse_field::<Role>("role", &req.role));
        errors.finish()?;

        self.ensure_email_free(&email).await?;
        let password_hash = hash_password(&req.password)?;
        let now = Utc::now();

        let created = user::ActiveModel {
            company_id: Set(ctx.company_id),
            name: Set(name),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(role.unwrap_or(Role::Technician).to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!("AuthService: user {} created by {}", created.id, ctx.user_id);
        Ok(created)
    }

    pub async fn update_user(
        &self,
        ctx: &TenantContext,
        id: i32,
        req: UpdateUserRequest,
    ) -> Result<user::Model> {
        ctx.require_admin()?;
        let db = self.storage.get_db();
        let existing = find_scoped::<user::Entity, _>(db, ctx.company_id, id).await?;

        if id == ctx.user_id && req.is_active == Some(false) {
            return Err(NestogyError::invalid_field(
                "is_active",
                "you cannot deactivate your own account",
            ));
        }

        let mut model: user::ActiveModel = existing.into();
        if let Some(name) = req.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(NestogyError::invalid_field("name", "is required"));
            }
            model.name = Set(name);
        }
        if let Some(role) = req.role {
            model.role = Set(parse_field::<Role>("role", &role)?.to_string());
        }
        if let Some(active) = req.is_active {
            model.is_active = Set(active);
        }
        if let Some(password) = req.password {
            model.password_hash = Set(hash_password(&password)?);
        }
        model.updated_at = Set(Utc::now());
        Ok(model.update(db).await?)
    }

    async fn ensure_email_free(&self, email: &str) -> Result<()> {
        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.storage.get_db())
            .await?
            .is_some();
        if taken {
            return Err(NestogyError::invalid_field("email", "has already been taken"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_role() {
        let tech = TenantContext::new(1, 2, Role::Technician);
        assert!(tech.require_billing().is_err());
        assert!(tech.require_admin().is_err());
        assert_eq!(
            tech.require_admin().unwrap_err().http_status(),
            actix_web::http::StatusCode::FORBIDDEN
        );

        let accountant = TenantContext::new(1, 3, Role::Accountant);
        assert!(accountant.require_billing().is_ok());
        assert!(accountant.require_admin().is_err());

        let admin = TenantContext::new(1, 4, Role::Admin);
        assert!(admin.require_billing().is_ok());
        assert!(admin.require_admin().is_ok());
    }
}
