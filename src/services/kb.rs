//! Knowledge base articles

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    ExprTrait, ModelTrait, QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{KbStatus, KbVisibility, parse_field};
use crate::services::TenantContext;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::{non_empty, slugify};
use migration::entities::kb_article;

const TITLE_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleInput {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub visibility: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilter {
    /// 标题或正文包含
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub visibility: Option<String>,
}

/// 在已占用的 slug 中为 `base` 选出第一个空位：base、base-2、base-3…
pub fn next_free_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// 标题没有可用字符时的 slug
fn base_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() { "article".to_string() } else { slug }
}

pub struct KbService {
    storage: Arc<SeaOrmStorage>,
}

impl KbService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &ArticleFilter,
        page: &PageRequest,
    ) -> Result<Paginated<kb_article::Model>> {
        let mut select = kb_article::Entity::find_in_tenant(ctx.company_id);
        if let Some(q) = filter.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(kb_article::Column::Title.contains(q))
                    .add(kb_article::Column::Body.contains(q)),
            );
        }
        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            select = select.filter(kb_article::Column::Category.eq(category));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<KbStatus>("status", s)?;
            select = select.filter(kb_article::Column::Status.eq(s.as_ref()));
        }
        if let Some(v) = filter.visibility.as_deref().filter(|v| !v.is_empty()) {
            let v = parse_field::<KbVisibility>("visibility", v)?;
            select = select.filter(kb_article::Column::Visibility.eq(v.as_ref()));
        }
        let select = select.order_by_desc(kb_article::Column::UpdatedAt);
        paginate(self.storage.get_db(), select, page).await
    }

    /// 读取文章并累加浏览次数
    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<kb_article::Model> {
        let db = self.storage.get_db();
        let mut article = find_scoped::<kb_article::Entity, _>(db, ctx.company_id, id).await?;
        kb_article::Entity::update_many()
            .col_expr(
                kb_article::Column::ViewCount,
                Expr::col(kb_article::Column::ViewCount).add(1),
            )
            .filter(kb_article::Column::Id.eq(article.id))
            .exec(db)
            .await?;
        article.view_count += 1;
        Ok(article)
    }

    pub async fn create(&self, ctx: &TenantContext, input: ArticleInput) -> Result<kb_article::Model> {
        let mut errors = FieldErrorsBuilder::new();
        let title = validate_title(input.title.as_deref(), true, &mut errors);
        let body = input.body.clone().unwrap_or_default();
        if body.trim().is_empty() {
            errors.add("body", "is required");
        }
        let visibility = match input.visibility.as_deref() {
            Some(v) => errors.capture("visibility", parse_field::<KbVisibility>("visibility", v)),
            None => Some(KbVisibility::Internal),
        };
        let status = match input.status.as_deref() {
            Some(s) => errors.capture("status", parse_field::<KbStatus>("status", s)),
            None => Some(KbStatus::Draft),
        };
        errors.finish()?;

        let title = title.unwrap_or_default();
        let txn = self.storage.begin().await?;
        let slug = unique_slug(&txn, ctx.company_id, &base_slug(&title), None).await?;
        let now = Utc::now();
        let created = kb_article::ActiveModel {
            company_id: Set(ctx.company_id),
            title: Set(title),
            slug: Set(slug),
            body: Set(body),
            category: Set(non_empty(input.category)),
            visibility: Set(visibility.unwrap_or(KbVisibility::Internal).to_string()),
            status: Set(status.unwrap_or(KbStatus::Draft).to_string()),
            view_count: Set(0),
            author_id: Set(Some(ctx.user_id)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!("KbService: created article '{}' ({})", created.title, created.slug);
        Ok(created)
    }

    /// 标题变化时重新生成 slug
    pub async fn update(&self, ctx: &TenantContext, id: i32, input: ArticleInput) -> Result<kb_article::Model> {
        let db = self.storage.get_db();
        let existing = find_scoped::<kb_article::Entity, _>(db, ctx.company_id, id).await?;

        let mut errors = FieldErrorsBuilder::new();
        let title = validate_title(input.title.as_deref(), false, &mut errors);
        if input.body.as_deref().is_some_and(|b| b.trim().is_empty()) {
            errors.add("body", "is required");
        }
        let visibility = input
            .visibility
            .as_deref()
            .and_then(|v| errors.capture("visibility", parse_field::<KbVisibility>("visibility", v)));
        let status = input
            .status
            .as_deref()
            .and_then(|s| errors.capture("status", parse_field::<KbStatus>("status", s)));
        errors.finish()?;

        let txn = self.storage.begin().await?;
        let new_slug = match &title {
            Some(t) if *t != existing.title => {
                Some(unique_slug(&txn, ctx.company_id, &base_slug(t), Some(existing.id)).await?)
            }
            _ => None,
        };
        let mut model: kb_article::ActiveModel = existing.into();
        if let Some(t) = title {
            model.title = Set(t);
        }
        if let Some(slug) = new_slug {
            model.slug = Set(slug);
        }
        if let Some(body) = input.body {
            model.body = Set(body);
        }
        if let Some(category) = input.category {
            model.category = Set(non_empty(Some(category)));
        }
        if let Some(v) = visibility {
            model.visibility = Set(v.to_string());
        }
        if let Some(s) = status {
            model.status = Set(s.to_string());
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        Ok(updated)
    }

    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let existing = find_scoped::<kb_article::Entity, _>(db, ctx.company_id, id).await?;
        if existing.author_id != Some(ctx.user_id) {
            ctx.require_admin().map_err(|_| {
                NestogyError::forbidden("Only the author or an admin can delete this article")
            })?;
        }
        let slug = existing.slug.clone();
        existing.delete(db).await?;
        info!("KbService: deleted article {}", slug);
        Ok(())
    }
}

fn validate_title(raw: Option<&str>, required: bool, errors: &mut FieldErrorsBuilder) -> Option<String> {
    match raw.map(str::trim) {
        Some("") => {
            errors.add("title", "is required");
            None
        }
        Some(t) if t.chars().count() > TITLE_MAX_CHARS => {
            errors.add("title", format!("may not be greater than {} characters", TITLE_MAX_CHARS));
            None
        }
        Some(t) => Some(t.to_string()),
        None if required => {
            errors.add("title", "is required");
            None
        }
        None => None,
    }
}

/// 租户内去重后的 slug
async fn unique_slug<C: ConnectionTrait>(
    db: &C,
    company_id: i32,
    base: &str,
    except_id: Option<i32>,
) -> Result<String> {
    let mut select = kb_article::Entity::find_in_tenant(company_id)
        .select_only()
        .column(kb_article::Column::Slug)
        .filter(
            Condition::any()
                .add(kb_article::Column::Slug.eq(base))
                .add(kb_article::Column::Slug.starts_with(format!("{}-", base))),
        );
    if let Some(id) = except_id {
        select = select.filter(kb_article::Column::Id.ne(id));
    }
    let taken: Vec<String> = select.into_tuple().all(db).await?;
    Ok(next_free_slug(base, &taken))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_free_slug() {
        assert_eq!(next_free_slug("vpn-setup", &[]), "vpn-setup");
        let taken = vec!["vpn-setup".to_string(), "vpn-setup-2".to_string()];
        assert_eq!(next_free_slug("vpn-setup", &taken), "vpn-setup-3");
        // 只有带后缀的被占用时仍可用原始 slug
        assert_eq!(next_free_slug("vpn-setup", &taken[1..]), "vpn-setup");
    }

    #[test]
    fn test_base_slug() {
        assert_eq!(base_slug("Reset a User's Password (M365)"), "reset-a-user-s-password-m365");
        assert_eq!(base_slug("!!!"), "article");
    }

    #[test]
    fn test_title_validation() {
        let mut errors = FieldErrorsBuilder::new();
        assert_eq!(validate_title(None, false, &mut errors), None);
        assert!(errors.is_empty());
        validate_title(Some(&"x".repeat(256)), true, &mut errors);
        validate_title(None, true, &mut errors);
        assert_eq!(errors.finish().unwrap_err().field_errors().unwrap()["title"].len(), 2);
    }
}
