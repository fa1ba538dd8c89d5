//! Physical mail orders sent through PostGrid

mod postgrid;

pub use postgrid::{LetterMetadata, LetterRequest, LetterResponse, PostGridAddress, PostGridClient};

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::get_config;
use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::jobs::{Job, JobQueue};
use crate::models::{MailOrderStatus, WebhookEventStatus, parse_field};
use crate::services::TenantContext;
use crate::services::webhook_events::{self, NewWebhookEvent, POSTGRID_SOURCE, WebhookReceipt};
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::non_empty;
use crate::utils::signature::verify_hex_signature;
use migration::entities::{client, invoice, physical_mail_order};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailOrderInput {
    pub client_id: Option<i32>,
    pub invoice_id: Option<i32>,
    /// 收件信息缺省时取客户档案中的地址
    pub recipient_name: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailOrderFilter {
    pub client_id: Option<i32>,
    pub status: Option<String>,
}

/// PostGrid webhook 事件
#[derive(Debug, Clone, Deserialize)]
pub struct PostGridEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PostGridEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostGridEventData {
    pub id: String,
    pub status: String,
    #[serde(default, alias = "trackingNumber")]
    pub tracking_number: Option<String>,
}

#[derive(Debug)]
struct Recipient {
    name: String,
    line1: String,
    line2: Option<String>,
    city: String,
    state: Option<String>,
    postal_code: String,
    country: String,
}

/// 合并请求字段与客户地址，缺少必填项时返回字段错误
fn resolve_recipient(input: &MailOrderInput, client: &client::Model) -> Result<Recipient> {
    let pick = |given: &Option<String>, fallback: &Option<String>| {
        non_empty(given.clone()).or_else(|| non_empty(fallback.clone()))
    };
    let name = non_empty(input.recipient_name.clone()).unwrap_or_else(|| client.name.clone());
    let line1 = pick(&input.address_line1, &client.address);
    let city = pick(&input.city, &client.city);
    let postal_code = pick(&input.postal_code, &client.postal_code);
    let country = pick(&input.country, &client.country).unwrap_or_else(|| "US".to_string());

    let mut errors = FieldErrorsBuilder::new();
    if line1.is_none() {
        errors.add("address_line1", "is required (client has no address on file)");
    }
    if city.is_none() {
        errors.add("city", "is required (client has no city on file)");
    }
    if postal_code.is_none() {
        errors.add("postal_code", "is required (client has no postal code on file)");
    }
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.add("country", "must be a two-letter country code");
    }
    errors.finish()?;

    Ok(Recipient {
        name,
        line1: line1.unwrap_or_default(),
        line2: non_empty(input.address_line2.clone()),
        city: city.unwrap_or_default(),
        state: pick(&input.state, &client.state),
        postal_code: postal_code.unwrap_or_default(),
        country: country.to_ascii_uppercase(),
    })
}

fn letter_request(order: &physical_mail_order::Model) -> LetterRequest {
    let body = order
        .description
        .clone()
        .unwrap_or_else(|| format!("Mail order #{}", order.id));
    LetterRequest {
        to: PostGridAddress {
            first_name: order.recipient_name.clone(),
            address_line1: order.address_line1.clone(),
            address_line2: order.address_line2.clone(),
            city: order.city.clone(),
            province_or_state: order.state.clone(),
            postal_or_zip: order.postal_code.clone(),
            country_code: order.country.clone(),
        },
        description: order.description.clone(),
        html: format!("<p>{}</p>", html_escape(&body)),
        metadata: LetterMetadata {
            order_id: order.id,
            company_id: order.company_id,
        },
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub struct MailService {
    storage: Arc<SeaOrmStorage>,
    jobs: JobQueue,
}

impl MailService {
    pub fn new(storage: Arc<SeaOrmStorage>, jobs: JobQueue) -> Self {
        Self { storage, jobs }
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &MailOrderFilter,
        page: &PageRequest,
    ) -> Result<Paginated<physical_mail_order::Model>> {
        let mut select = physical_mail_order::Entity::find_in_tenant(ctx.company_id);
        if let Some(id) = filter.client_id {
            select = select.filter(physical_mail_order::Column::ClientId.eq(id));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<MailOrderStatus>("status", s)?;
            select = select.filter(physical_mail_order::Column::Status.eq(s.as_ref()));
        }
        let select = select.order_by_desc(physical_mail_order::Column::Id);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<physical_mail_order::Model> {
        find_scoped::<physical_mail_order::Entity, _>(self.storage.get_db(), ctx.company_id, id).await
    }

    /// 创建订单（pending）并排队提交到 PostGrid
    pub async fn create(&self, ctx: &TenantContext, input: MailOrderInput) -> Result<physical_mail_order::Model> {
        ctx.require_billing()?;
        let db = self.storage.get_db();
        let client_id = input
            .client_id
            .ok_or_else(|| NestogyError::invalid_field("client_id", "is required"))?;
        let client = client::Entity::find_in_tenant(ctx.company_id)
            .filter(client::Column::Id.eq(client_id))
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::invalid_field("client_id", "does not exist"))?;
        if let Some(invoice_id) = input.invoice_id {
            let found = invoice::Entity::find_in_tenant(ctx.company_id)
                .filter(invoice::Column::Id.eq(invoice_id))
                .filter(invoice::Column::ClientId.eq(client_id))
                .one(db)
                .await?;
            if found.is_none() {
                return Err(NestogyError::invalid_field(
                    "invoice_id",
                    "does not exist for this client",
                ));
            }
        }
        let recipient = resolve_recipient(&input, &client)?;

        let now = Utc::now();
        let created = physical_mail_order::ActiveModel {
            company_id: Set(ctx.company_id),
            client_id: Set(client_id),
            invoice_id: Set(input.invoice_id),
            provider_id: Set(None),
            recipient_name: Set(recipient.name),
            address_line1: Set(recipient.line1),
            address_line2: Set(recipient.line2),
            city: Set(recipient.city),
            state: Set(recipient.state),
            postal_code: Set(recipient.postal_code),
            country: Set(recipient.country),
            description: Set(non_empty(input.description)),
            status: Set(MailOrderStatus::Pending.to_string()),
            tracking_number: Set(None),
            last_event_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!("MailService: created mail order {} for client {}", created.id, client_id);
        if let Err(e) = self.jobs.try_enqueue(Job::SubmitMailOrder { order_id: created.id }) {
            // 订单已保存，保持 pending；记录日志即可
            warn!("MailService: could not queue submission of order {}: {}", created.id, e);
        }
        Ok(created)
    }

    /// 只有 pending / submitted 的订单可以取消；已提交的同时在 PostGrid 侧取消
    pub async fn cancel(&self, ctx: &TenantContext, id: i32) -> Result<physical_mail_order::Model> {
        ctx.require_billing()?;
        let order = self.get(ctx, id).await?;
        let status = parse_field::<MailOrderStatus>("status", &order.status)?;
        if !status.is_cancellable() {
            return Err(NestogyError::validation(format!(
                "Mail order {} is {} and can no longer be cancelled",
                order.id, status
            )));
        }

        if let Some(provider_id) = order.provider_id.as_deref() {
            let client = PostGridClient::from_config(&get_config().postgrid)
                .ok_or_else(|| NestogyError::misconfigured("PostGrid API key is not configured"))?;
            client.cancel_letter(provider_id).await?;
        }

        let mut model: physical_mail_order::ActiveModel = order.into();
        model.status = Set(MailOrderStatus::Cancelled.to_string());
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.storage.get_db()).await?;
        info!("MailService: cancelled mail order {}", updated.id);
        Ok(updated)
    }

    /// 重新排队提交仍为 pending 的订单；队列已满时返回 503
    pub async fn resubmit(&self, ctx: &TenantContext, id: i32) -> Result<physical_mail_order::Model> {
        ctx.require_billing()?;
        let order = self.get(ctx, id).await?;
        if order.status != MailOrderStatus::Pending.as_ref() || order.provider_id.is_some() {
            return Err(NestogyError::validation(format!(
                "Mail order {} is {} and has already been submitted",
                order.id, order.status
            )));
        }
        self.jobs.try_enqueue(Job::SubmitMailOrder { order_id: order.id })?;
        info!("MailService: re-queued submission of order {}", order.id);
        Ok(order)
    }

    /// 尚未提交到 PostGrid 的 pending 订单（全部租户），启动时重新入队
    pub async fn unsubmitted_order_ids(&self) -> Result<Vec<i32>> {
        let orders = physical_mail_order::Entity::find()
            .filter(physical_mail_order::Column::Status.eq(MailOrderStatus::Pending.as_ref()))
            .filter(physical_mail_order::Column::ProviderId.is_null())
            .order_by_asc(physical_mail_order::Column::Id)
            .all(self.storage.get_db())
            .await?;
        Ok(orders.into_iter().map(|o| o.id).collect())
    }

    /// SubmitMailOrder：调用 PostGrid 创建信件
    pub async fn submit_order(&self, order_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let order = physical_mail_order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| NestogyError::not_found(format!("Mail order {} not found", order_id)))?;
        if order.status != MailOrderStatus::Pending.as_ref() {
            debug!(
                "MailService: order {} is {}, nothing to submit",
                order.id, order.status
            );
            return Ok(());
        }

        let client = PostGridClient::from_config(&get_config().postgrid)
            .ok_or_else(|| NestogyError::misconfigured("PostGrid API key is not configured"))?;
        let letter = client.create_letter(letter_request(&order)).await?;

        let status = letter
            .status
            .as_deref()
            .and_then(MailOrderStatus::from_provider)
            .unwrap_or(MailOrderStatus::Submitted);
        let mut model: physical_mail_order::ActiveModel = order.into();
        model.provider_id = Set(Some(letter.id.clone()));
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now());
        model.update(db).await?;

        info!("MailService: order {} submitted as {}", order_id, letter.id);
        Ok(())
    }

    /// 接收 PostGrid webhook
    pub async fn receive_webhook(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookReceipt> {
        let config = get_config();
        let secret = config
            .postgrid
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NestogyError::misconfigured("PostGrid webhook secret is not configured"))?;
        if !signature.is_some_and(|sig| verify_hex_signature(secret, body, sig)) {
            return Err(NestogyError::unauthorized("Invalid webhook signature"));
        }

        let event: PostGridEvent = serde_json::from_slice(body)
            .map_err(|e| NestogyError::validation(format!("Invalid PostGrid event: {}", e)))?;

        let db = self.storage.get_db();
        let company_id = physical_mail_order::Entity::find()
            .filter(physical_mail_order::Column::ProviderId.eq(event.data.id.as_str()))
            .one(db)
            .await?
            .map(|o| o.company_id);

        let raw = String::from_utf8_lossy(body);
        let (recorded, duplicate) = webhook_events::record_event(
            db,
            self.storage.retry_config(),
            NewWebhookEvent {
                company_id,
                source: POSTGRID_SOURCE,
                external_id: &event.id,
                event_type: Some(event.event_type.clone()),
                payload: &raw,
            },
        )
        .await?;

        if !duplicate {
            self.jobs.try_enqueue(Job::ProcessMailEvent { event_id: recorded.id })?;
        }
        Ok(WebhookReceipt {
            event_id: recorded.id,
            duplicate,
        })
    }

    /// ProcessMailEvent：把服务商状态同步到订单
    pub async fn process_event(&self, event_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let event = webhook_events::load_event(db, event_id).await?;
        if event.status == WebhookEventStatus::Processed.as_ref() {
            return Ok(());
        }
        webhook_events::begin_attempt(db, event_id).await?;

        match self.apply_event(&event.payload).await {
            Ok(()) => webhook_events::mark_processed(db, event_id).await,
            Err(e) => {
                webhook_events::mark_failed(db, event_id, &e).await?;
                Err(e)
            }
        }
    }

    async fn apply_event(&self, payload: &str) -> Result<()> {
        let db = self.storage.get_db();
        let event: PostGridEvent = serde_json::from_str(payload)?;
        let order = physical_mail_order::Entity::find()
            .filter(physical_mail_order::Column::ProviderId.eq(event.data.id.as_str()))
            .one(db)
            .await?
            .ok_or_else(|| {
                NestogyError::integration(format!("No mail order for PostGrid id {}", event.data.id))
            })?;

        let Some(status) = MailOrderStatus::from_provider(&event.data.status) else {
            debug!(
                "MailService: ignoring unknown PostGrid status '{}' for order {}",
                event.data.status, order.id
            );
            return Ok(());
        };

        let current = parse_field::<MailOrderStatus>("status", &order.status)?;
        if current.is_final() && status != current {
            warn!(
                "MailService: order {} is already {}, ignoring late PostGrid status '{}'",
                order.id, current, event.data.status
            );
            return Ok(());
        }

        let order_id = order.id;
        let mut model: physical_mail_order::ActiveModel = order.into();
        model.status = Set(status.to_string());
        if let Some(tracking) = non_empty(event.data.tracking_number) {
            model.tracking_number = Set(Some(tracking));
        }
        model.last_event_at = Set(Some(Utc::now()));
        model.updated_at = Set(Utc::now());
        model.update(db).await?;

        info!("MailService: order {} is now {}", order_id, status);
        Ok(())
    }
}
