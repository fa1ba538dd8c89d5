//! API 路由配置
//!
//! - `/api/v1/...`：Bearer JWT 认证的租户 API
//! - `/webhooks/...`：签名校验的 webhook 接收端（限流）
//! - `/oauth/...`：OAuth2 服务商回调（无需登录）
//! - `/health`：健康检查

pub mod assets;
pub mod auth;
pub mod billing;
pub mod clients;
pub mod health;
pub mod integrations;
pub mod messaging;
pub mod rate_limit;
pub mod tickets;
mod upload;
pub mod webhooks;

pub use health::{AppStartTime, health_routes};

use actix_web::web;

use crate::api::middleware::TenantAuth;
use crate::api::response::{json_error_handler, path_error_handler, query_error_handler};
use crate::config::get_config;
use rate_limit::{login_rate_limiter, webhook_rate_limiter};

/// 租户 API 前缀
pub const API_PREFIX: &str = "/api/v1";

/// JSON 请求体上限
const JSON_LIMIT_BYTES: usize = 1024 * 1024;

/// 认证路由 `/auth`
fn auth_routes() -> actix_web::Scope {
    web::scope("/auth")
        .route(
            "/login",
            web::post().to(auth::login).wrap(login_rate_limiter()),
        )
        .route("/me", web::get().to(auth::me))
}

fn user_routes() -> actix_web::Scope {
    web::scope("/users")
        .route("", web::get().to(auth::list_users))
        .route("", web::post().to(auth::create_user))
        .route("/{id}", web::put().to(auth::update_user))
}

/// 客户路由 `/clients`（含联系人、导入导出）
fn client_routes() -> actix_web::Scope {
    web::scope("/clients")
        .route("", web::get().to(clients::list_clients))
        .route("", web::post().to(clients::create_client))
        // import/export 必须在 /{id} 之前
        .route("/import", web::post().to(clients::import_clients))
        .route("/export", web::get().to(clients::export_clients))
        .route("/{id}", web::get().to(clients::get_client))
        .route("/{id}", web::put().to(clients::update_client))
        .route("/{id}", web::delete().to(clients::delete_client))
        .route("/{id}/contacts", web::get().to(clients::list_contacts))
        .route("/{id}/contacts", web::post().to(clients::create_contact))
        .route(
            "/{id}/contacts/{contact_id}",
            web::put().to(clients::update_contact),
        )
        .route(
            "/{id}/contacts/{contact_id}",
            web::delete().to(clients::delete_contact),
        )
}

fn asset_routes() -> actix_web::Scope {
    web::scope("/assets")
        .route("", web::get().to(assets::list_assets))
        .route("", web::post().to(assets::create_asset))
        .route("/import", web::post().to(assets::import_assets))
        .route("/export", web::get().to(assets::export_assets))
        .route("/{id}", web::get().to(assets::get_asset))
        .route("/{id}", web::put().to(assets::update_asset))
        .route("/{id}", web::delete().to(assets::delete_asset))
}

fn contract_routes() -> actix_web::Scope {
    web::scope("/contracts")
        .route("", web::get().to(assets::list_contracts))
        .route("", web::post().to(assets::create_contract))
        .route("/{id}", web::get().to(assets::get_contract))
        .route("/{id}", web::put().to(assets::update_contract))
        .route("/{id}", web::delete().to(assets::delete_contract))
        .route("/{id}/assets", web::get().to(assets::list_contract_assets))
        .route(
            "/{id}/assets/{asset_id}",
            web::post().to(assets::attach_contract_asset),
        )
        .route(
            "/{id}/assets/{asset_id}",
            web::delete().to(assets::detach_contract_asset),
        )
}

fn ticket_routes() -> actix_web::Scope {
    web::scope("/tickets")
        .route("", web::get().to(tickets::list_tickets))
        .route("", web::post().to(tickets::create_ticket))
        .route("/{id}", web::get().to(tickets::get_ticket))
        .route("/{id}", web::put().to(tickets::update_ticket))
        .route("/{id}", web::delete().to(tickets::delete_ticket))
}

fn kb_routes() -> actix_web::Scope {
    web::scope("/kb/articles")
        .route("", web::get().to(tickets::list_articles))
        .route("", web::post().to(tickets::create_article))
        .route("/{id}", web::get().to(tickets::get_article))
        .route("/{id}", web::put().to(tickets::update_article))
        .route("/{id}", web::delete().to(tickets::delete_article))
}

/// 考勤路由 `/timeclock`
fn timeclock_routes() -> actix_web::Scope {
    web::scope("/timeclock")
        .route("", web::get().to(billing::list_clock_entries))
        .route("/clock-in", web::post().to(billing::clock_in))
        .route("/clock-out", web::post().to(billing::clock_out))
        .route("/{id}", web::get().to(billing::get_clock_entry))
        .route("/{id}", web::put().to(billing::update_clock_entry))
        .route("/{id}/approve", web::post().to(billing::approve_clock_entry))
        .route("/{id}/reject", web::post().to(billing::reject_clock_entry))
}

fn time_entry_routes() -> actix_web::Scope {
    web::scope("/time-entries")
        .route("", web::get().to(billing::list_time_entries))
        .route("", web::post().to(billing::create_time_entry))
        .route("/approve", web::post().to(billing::approve_time_entries))
        .route("/reject", web::post().to(billing::reject_time_entries))
        .route("/{id}", web::get().to(billing::get_time_entry))
        .route("/{id}", web::put().to(billing::update_time_entry))
        .route("/{id}", web::delete().to(billing::delete_time_entry))
}

fn rate_card_routes() -> actix_web::Scope {
    web::scope("/rate-cards")
        .route("", web::get().to(billing::list_rate_cards))
        .route("", web::post().to(billing::create_rate_card))
        .route("/{id}", web::get().to(billing::get_rate_card))
        .route("/{id}", web::put().to(billing::update_rate_card))
        .route("/{id}", web::delete().to(billing::delete_rate_card))
}

fn invoice_routes() -> actix_web::Scope {
    web::scope("/invoices")
        .route("", web::get().to(billing::list_invoices))
        .route("", web::post().to(billing::create_invoice))
        .route(
            "/generate-from-time",
            web::post().to(billing::generate_invoices),
        )
        .route("/export", web::get().to(billing::export_invoices))
        .route("/{id}", web::get().to(billing::get_invoice))
        .route("/{id}", web::put().to(billing::update_invoice))
        .route("/{id}", web::delete().to(billing::delete_invoice))
        .route(
            "/{id}/transition",
            web::post().to(billing::transition_invoice),
        )
}

fn rmm_routes() -> actix_web::Scope {
    web::scope("/rmm/integrations")
        .route("", web::get().to(integrations::list_integrations))
        .route("", web::post().to(integrations::create_integration))
        .route("/{id}", web::get().to(integrations::get_integration))
        .route("/{id}", web::put().to(integrations::update_integration))
        .route("/{id}", web::delete().to(integrations::delete_integration))
        .route("/{id}/test", web::post().to(integrations::test_integration))
}

fn mail_routes() -> actix_web::Scope {
    web::scope("/mail/orders")
        .route("", web::get().to(integrations::list_mail_orders))
        .route("", web::post().to(integrations::create_mail_order))
        .route("/{id}", web::get().to(integrations::get_mail_order))
        .route("/{id}/cancel", web::post().to(integrations::cancel_mail_order))
        .route("/{id}/submit", web::post().to(integrations::resubmit_mail_order))
}

fn email_account_routes() -> actix_web::Scope {
    web::scope("/email-accounts")
        .route("", web::get().to(messaging::list_email_accounts))
        .route("", web::post().to(messaging::link_email_account))
        .route("/{id}", web::get().to(messaging::get_email_account))
        .route("/{id}", web::delete().to(messaging::disconnect_email_account))
        .route("/{id}/refresh", web::post().to(messaging::refresh_email_account))
}

fn report_routes() -> actix_web::Scope {
    web::scope("/reports")
        .route("/dashboard", web::get().to(integrations::dashboard))
        .route("/clients/{id}/qbr", web::get().to(integrations::client_qbr))
}

/// 租户 API v1 路由（不含认证中间件）
pub fn api_v1_routes() -> actix_web::Scope {
    web::scope(API_PREFIX)
        .service(auth_routes())
        .service(user_routes())
        .service(client_routes())
        .service(asset_routes())
        .service(contract_routes())
        .service(ticket_routes())
        .service(kb_routes())
        .service(timeclock_routes())
        .route("/payroll/export", web::post().to(billing::export_payroll))
        .service(time_entry_routes())
        .service(rate_card_routes())
        .service(invoice_routes())
        .service(rmm_routes())
        .service(mail_routes())
        .service(report_routes())
        .service(email_account_routes())
        .route("/notifications/sms", web::post().to(messaging::send_sms))
}

/// OAuth2 回调路由 `/oauth`
pub fn oauth_routes() -> actix_web::Scope {
    web::scope("/oauth").route("/{provider}/callback", web::get().to(messaging::oauth_callback))
}

/// Webhook 路由 `/webhooks`
pub fn webhook_routes() -> actix_web::Scope {
    web::scope("/webhooks")
        .route("/rmm/{uuid}", web::post().to(webhooks::receive_rmm))
        .route("/postgrid", web::post().to(webhooks::receive_postgrid))
}

/// 注册全部路由与提取器配置
///
/// 调用方需提供 `web::Data<AppServices>` 和 `web::Data<AppStartTime>`。
pub fn configure(cfg: &mut web::ServiceConfig) {
    let max_body_bytes = get_config().webhooks.max_body_bytes;
    let login_path = format!("{}/auth/login", API_PREFIX);

    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_LIMIT_BYTES)
            .error_handler(json_error_handler),
    )
    .app_data(web::QueryConfig::default().error_handler(query_error_handler))
    .app_data(web::PathConfig::default().error_handler(path_error_handler))
    .service(health_routes())
    .service(
        webhook_routes()
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .wrap(webhook_rate_limiter()),
    )
    .service(oauth_routes().wrap(webhook_rate_limiter()))
    .service(api_v1_routes().wrap(TenantAuth::new([login_path])));
}
