//! OAuth2 邮箱关联（Google / Microsoft）
//!
//! `begin_link` 生成授权地址并保存一次性 state，服务商回调 `complete_link`
//! 用授权码换取 token。token 只入库，不通过 API 返回。

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ureq::Agent;
use url::Url;

use crate::config::{OAuthClientConfig, OAuthConfig, get_config};
use crate::errors::{NestogyError, Result};
use crate::models::{EmailAccountStatus, EmailProvider, Role, parse_field};
use crate::services::TenantContext;
use crate::storage::{SeaOrmStorage, TenantScoped, find_scoped};
use crate::utils::generate_secure_token;
use migration::entities::email_account;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_SCOPES: &str = "openid email https://mail.google.com/";
const MICROSOFT_SCOPES: &str = "openid email offline_access \
    https://outlook.office.com/IMAP.AccessAsUser.All https://outlook.office.com/SMTP.Send";

const STATE_LENGTH: usize = 48;

/// 服务商 token 端点的响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// token 端点调用
#[async_trait::async_trait]
pub trait OAuthTokenClient: Send + Sync {
    async fn request_token(&self, token_url: &str, form: Vec<(&'static str, String)>) -> Result<TokenResponse>;
}

/// ureq 实现，调用放在 spawn_blocking 中
#[derive(Clone)]
pub struct HttpTokenClient {
    agent: Agent,
}

impl HttpTokenClient {
    pub fn from_config(config: &OAuthConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .build()
            .into();
        Self { agent }
    }

    fn request_token_sync(&self, token_url: &str, form: &[(&'static str, String)]) -> Result<TokenResponse> {
        let resp = self
            .agent
            .post(token_url)
            .header("Accept", "application/json")
            .send_form(form.iter().map(|(k, v)| (*k, v.as_str())))
            .map_err(|e| NestogyError::integration(format!("OAuth token request failed: {}", e)))?;
        resp.into_body()
            .read_json()
            .map_err(|e| NestogyError::integration(format!("OAuth token response parse failed: {}", e)))
    }
}

#[async_trait::async_trait]
impl OAuthTokenClient for HttpTokenClient {
    async fn request_token(&self, token_url: &str, form: Vec<(&'static str, String)>) -> Result<TokenResponse> {
        let client = self.clone();
        let token_url = token_url.to_string();
        tokio::task::spawn_blocking(move || client.request_token_sync(&token_url, &form))
            .await
            .unwrap_or_else(|e| {
                warn!("OAuth spawn_blocking failed: {}", e);
                Err(NestogyError::internal("OAuth worker thread failed"))
            })
    }
}

/// 某个服务商的 OAuth 客户端参数，三项缺一即视为未配置
#[derive(Debug, Clone)]
struct ProviderClient {
    provider: EmailProvider,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    tenant: String,
}

impl ProviderClient {
    fn from_config(config: &OAuthConfig, provider: EmailProvider) -> Result<Self> {
        let section: &OAuthClientConfig = match provider {
            EmailProvider::Google => &config.google,
            EmailProvider::Microsoft => &config.microsoft,
        };
        let get = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        match (
            get(&section.client_id),
            get(&section.client_secret),
            get(&section.redirect_uri),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(Self {
                provider,
                client_id,
                client_secret,
                redirect_uri,
                tenant: config.microsoft_tenant.clone(),
            }),
            _ => Err(NestogyError::misconfigured(format!(
                "OAuth client for {} is not configured",
                provider
            ))),
        }
    }

    fn authorize_endpoint(&self) -> String {
        match self.provider {
            EmailProvider::Google => GOOGLE_AUTHORIZE_URL.to_string(),
            EmailProvider::Microsoft => format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                self.tenant
            ),
        }
    }

    fn token_endpoint(&self) -> String {
        match self.provider {
            EmailProvider::Google => GOOGLE_TOKEN_URL.to_string(),
            EmailProvider::Microsoft => format!("https://login.microsoftonline.com/{}/oauth2/v2.0/token", self.tenant),
        }
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("state", state),
        ];
        match self.provider {
            // Google 只有 offline + consent 才会返回 refresh_token
            EmailProvider::Google => params.extend([
                ("scope", GOOGLE_SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ]),
            EmailProvider::Microsoft => params.extend([("scope", MICROSOFT_SCOPES), ("response_mode", "query")]),
        }
        Url::parse_with_params(&self.authorize_endpoint(), &params)
            .map(String::from)
            .map_err(|e| NestogyError::internal(format!("Failed to build authorize URL: {}", e)))
    }

    fn code_grant(&self, code: &str) -> Vec<(&'static str, String)> {
        vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ]
    }

    fn refresh_grant(&self, refresh_token: &str) -> Vec<(&'static str, String)> {
        vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
}

/// 从 id_token 中取邮箱。token 由服务商 token 端点经 TLS 直接返回，这里不校验签名
fn email_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes).ok()?;
    claims
        .email
        .or(claims.preferred_username)
        .filter(|e| e.contains('@'))
}

fn expires_at(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .filter(|s| *s > 0)
        .and_then(TimeDelta::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
}

/// state 有效期，限制在 1 分钟到 1 天之间
fn state_ttl(config: &OAuthConfig) -> TimeDelta {
    TimeDelta::minutes(config.state_minutes.clamp(1, 24 * 60))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkRequest {
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkStart {
    pub account_id: i32,
    pub provider: EmailProvider,
    pub authorize_url: String,
    pub expires_at: DateTime<Utc>,
}

/// 服务商回调参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct EmailAccountService {
    storage: Arc<SeaOrmStorage>,
    tokens: Arc<dyn OAuthTokenClient>,
}

impl EmailAccountService {
    pub fn new(storage: Arc<SeaOrmStorage>, tokens: Arc<dyn OAuthTokenClient>) -> Self {
        Self { storage, tokens }
    }

    /// 管理员看到本租户全部账户，其他人只看到自己的
    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<email_account::Model>> {
        let mut select = email_account::Entity::find_in_tenant(ctx.company_id);
        if ctx.role != Role::Admin {
            select = select.filter(email_account::Column::UserId.eq(ctx.user_id));
        }
        Ok(select
            .order_by_desc(email_account::Column::CreatedAt)
            .all(self.storage.get_db())
            .await?)
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<email_account::Model> {
        let account = find_scoped::<email_account::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        ensure_owner(ctx, &account)?;
        Ok(account)
    }

    /// 创建 pending 账户并返回服务商授权地址
    pub async fn begin_link(&self, ctx: &TenantContext, req: LinkRequest) -> Result<LinkStart> {
        let provider = parse_field::<EmailProvider>(
            "provider",
            req.provider
                .as_deref()
                .ok_or_else(|| NestogyError::invalid_field("provider", "is required"))?,
        )?;
        let config = get_config();
        let client = ProviderClient::from_config(&config.oauth, provider)?;

        let state = generate_secure_token(STATE_LENGTH);
        let authorize_url = client.authorize_url(&state)?;
        let now = Utc::now();
        let account = email_account::ActiveModel {
            company_id: Set(ctx.company_id),
            user_id: Set(ctx.user_id),
            provider: Set(provider.to_string()),
            status: Set(EmailAccountStatus::Pending.to_string()),
            oauth_state: Set(Some(state)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!(
            "EmailAccountService: user {} started {} link (account {})",
            ctx.user_id, provider, account.id
        );
        Ok(LinkStart {
            account_id: account.id,
            provider,
            authorize_url,
            expires_at: now + state_ttl(&config.oauth),
        })
    }

    /// 服务商回调：按 state 找到账户并用授权码换 token；state 只能用一次
    pub async fn complete_link(&self, provider: &str, callback: OAuthCallback) -> Result<email_account::Model> {
        let provider = parse_field::<EmailProvider>("provider", provider)?;
        let state = callback
            .state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NestogyError::invalid_field("state", "is required"))?;

        let db = self.storage.get_db();
        let account = email_account::Entity::find()
            .filter(email_account::Column::OauthState.eq(state))
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::not_found("Email account link request"))?;
        if account.provider != provider.as_ref() {
            return Err(NestogyError::invalid_field("state", "does not belong to this provider"));
        }

        let config = get_config();
        let deadline = account.created_at + state_ttl(&config.oauth);
        if Utc::now() > deadline {
            self.mark_error(account, "Authorization request expired").await?;
            return Err(NestogyError::invalid_field("state", "has expired, start the link again"));
        }
        if let Some(error) = callback.error.as_deref() {
            let message = callback
                .error_description
                .as_deref()
                .map(|d| format!("{}: {}", error, d))
                .unwrap_or_else(|| error.to_string());
            warn!("EmailAccountService: provider denied account {}: {}", account.id, message);
            return self.mark_error(account, &message).await;
        }
        let code = callback
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NestogyError::invalid_field("code", "is required"))?;

        let client = ProviderClient::from_config(&config.oauth, provider)?;
        let token = match self
            .tokens
            .request_token(&client.token_endpoint(), client.code_grant(code))
            .await
        {
            Ok(token) => token,
            Err(e) => {
                self.mark_error(account, &e.to_string()).await?;
                return Err(e);
            }
        };

        let now = Utc::now();
        let email = token.id_token.as_deref().and_then(email_from_id_token);
        let mut model: email_account::ActiveModel = account.into();
        model.status = Set(EmailAccountStatus::Connected.to_string());
        model.oauth_state = Set(None);
        model.access_token = Set(Some(token.access_token));
        model.refresh_token = Set(token.refresh_token);
        model.token_expires_at = Set(expires_at(now, token.expires_in));
        model.scopes = Set(token.scope);
        model.last_error = Set(None);
        if email.is_some() {
            model.email = Set(email);
        }
        model.updated_at = Set(now);
        let updated = model.update(db).await?;

        info!(
            "EmailAccountService: account {} connected to {} ({})",
            updated.id,
            provider,
            updated.email.as_deref().unwrap_or("unknown address")
        );
        Ok(updated)
    }

    /// 用 refresh_token 换新的 access_token；服务商未返回新 refresh_token 时保留旧的
    pub async fn refresh(&self, ctx: &TenantContext, id: i32) -> Result<email_account::Model> {
        let account = self.get(ctx, id).await?;
        let refresh_token = match (account.status.as_str(), account.refresh_token.clone()) {
            (s, Some(token)) if s != EmailAccountStatus::Revoked.as_ref() => token,
            _ => {
                return Err(NestogyError::validation(
                    "Email account has no refresh token, link it again",
                ));
            }
        };
        let provider = parse_field::<EmailProvider>("provider", &account.provider)?;
        let client = ProviderClient::from_config(&get_config().oauth, provider)?;

        let token = match self
            .tokens
            .request_token(&client.token_endpoint(), client.refresh_grant(&refresh_token))
            .await
        {
            Ok(token) => token,
            Err(e) => {
                self.mark_error(account, &e.to_string()).await?;
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut model: email_account::ActiveModel = account.into();
        model.status = Set(EmailAccountStatus::Connected.to_string());
        model.access_token = Set(Some(token.access_token));
        if let Some(rotated) = token.refresh_token {
            model.refresh_token = Set(Some(rotated));
        }
        model.token_expires_at = Set(expires_at(now, token.expires_in));
        if token.scope.is_some() {
            model.scopes = Set(token.scope);
        }
        model.last_error = Set(None);
        model.updated_at = Set(now);
        let updated = model.update(self.storage.get_db()).await?;
        debug!("EmailAccountService: refreshed token for account {}", updated.id);
        Ok(updated)
    }

    /// 断开：清空 token 与 state，保留记录
    pub async fn disconnect(&self, ctx: &TenantContext, id: i32) -> Result<email_account::Model> {
        let account = self.get(ctx, id).await?;
        let mut model: email_account::ActiveModel = account.into();
        model.status = Set(EmailAccountStatus::Revoked.to_string());
        model.oauth_state = Set(None);
        model.access_token = Set(None);
        model.refresh_token = Set(None);
        model.token_expires_at = Set(None);
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.storage.get_db()).await?;
        info!("EmailAccountService: account {} disconnected by user {}", updated.id, ctx.user_id);
        Ok(updated)
    }

    async fn mark_error(&self, account: email_account::Model, message: &str) -> Result<email_account::Model> {
        let mut model: email_account::ActiveModel = account.into();
        model.status = Set(EmailAccountStatus::Error.to_string());
        model.oauth_state = Set(None);
        model.last_error = Set(Some(message.to_string()));
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.storage.get_db()).await?)
    }
}

fn ensure_owner(ctx: &TenantContext, account: &email_account::Model) -> Result<()> {
    if ctx.role == Role::Admin || account.user_id == ctx.user_id {
        Ok(())
    } else {
        Err(NestogyError::forbidden("This email account belongs to another user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> ProviderClient {
        ProviderClient {
            provider: EmailProvider::Google,
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://psa.example.com/oauth/google/callback".into(),
            tenant: "common".into(),
        }
    }

    #[test]
    fn test_provider_client_requires_all_settings() {
        let mut config = OAuthConfig::default();
        let err = ProviderClient::from_config(&config, EmailProvider::Google).unwrap_err();
        assert_eq!(err.http_status().as_u16(), 500);

        config.microsoft = OAuthClientConfig {
            client_id: Some("mid".into()),
            client_secret: Some("msecret".into()),
            redirect_uri: Some("https://psa.example.com/cb".into()),
        };
        config.microsoft_tenant = "contoso.onmicrosoft.com".into();
        let ms = ProviderClient::from_config(&config, EmailProvider::Microsoft).unwrap();
        assert_eq!(
            ms.token_endpoint(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_google_authorize_url_requests_offline_access() {
        let url = Url::parse(&google().authorize_url("st4te").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "st4te");
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["redirect_uri"], "https://psa.example.com/oauth/google/callback");
        assert!(params["scope"].contains("https://mail.google.com/"));
    }

    #[test]
    fn test_grants_carry_client_credentials() {
        let form = google().code_grant("abc");
        assert!(form.contains(&("grant_type", "authorization_code".to_string())));
        assert!(form.contains(&("code", "abc".to_string())));
        assert!(form.contains(&("client_secret", "secret".to_string())));

        let form = google().refresh_grant("rt");
        assert!(form.contains(&("grant_type", "refresh_token".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "redirect_uri"));
    }

    #[test]
    fn test_email_from_id_token() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"1","email":"tech@example.com"}"#);
        assert_eq!(
            email_from_id_token(&format!("h.{}.s", payload)).as_deref(),
            Some("tech@example.com")
        );
        let ms = URL_SAFE_NO_PAD.encode(r#"{"preferred_username":"ops@contoso.com"}"#);
        assert_eq!(email_from_id_token(&format!("h.{}.s", ms)).as_deref(), Some("ops@contoso.com"));
        assert!(email_from_id_token("garbage").is_none());
    }

    #[test]
    fn test_expires_at_ignores_missing_or_negative() {
        let now = Utc::now();
        assert_eq!(expires_at(now, Some(3600)), Some(now + TimeDelta::seconds(3600)));
        assert!(expires_at(now, Some(-5)).is_none());
        assert!(expires_at(now, None).is_none());
    }
}
