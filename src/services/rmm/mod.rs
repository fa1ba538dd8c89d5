//! RMM integrations and webhook ingestion

mod detect;

pub use detect::{DetectedFields, FieldMappings, RmmField, detect_fields, lookup_path, parse_mappings};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::jobs::{Job, JobQueue};
use crate::models::{
    AssetStatus, AssetType, RmmVendor, Severity, SupportStatus, TicketPriority, TicketSource,
    TicketStatus, deserialize_some, parse_field,
};
use crate::services::TenantContext;
use crate::services::tickets::{NewTicket, TicketService};
use crate::services::webhook_events::{
    self, NewWebhookEvent, WebhookReceipt, parse_rmm_source, rmm_source,
};
use crate::storage::{SeaOrmStorage, TenantScoped, find_scoped};
use crate::utils::non_empty;
use crate::utils::signature::{constant_time_eq, sha256_hex, verify_hex_signature};
use migration::entities::{asset, client, rmm_integration, webhook_event};

const INTEGRATION_CACHE_TTL: Duration = Duration::from_secs(60);
const INTEGRATION_CACHE_CAPACITY: u64 = 10_000;
const SUBJECT_MAX_CHARS: usize = 200;

/// 调用方提供的认证头
#[derive(Debug, Clone, Default)]
pub struct WebhookCredentials {
    /// X-Webhook-Signature
    pub signature: Option<String>,
    /// X-Api-Key 或 Authorization: Bearer
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationInput {
    pub name: Option<String>,
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub api_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub webhook_secret: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub default_client_id: Option<Option<i32>>,
    pub auto_create_assets: Option<bool>,
    pub ticket_min_severity: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub field_mappings: Option<Option<Value>>,
    pub is_active: Option<bool>,
}

/// 对外展示的集成：密钥只报告是否已设置
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationView {
    #[serde(flatten)]
    pub integration: rmm_integration::Model,
    pub has_api_key: bool,
    pub has_webhook_secret: bool,
    pub field_mappings_parsed: Option<Value>,
    pub webhook_path: String,
}

impl From<rmm_integration::Model> for IntegrationView {
    fn from(integration: rmm_integration::Model) -> Self {
        Self {
            has_api_key: integration.api_key.is_some(),
            has_webhook_secret: integration.webhook_secret.is_some(),
            field_mappings_parsed: integration
                .field_mappings
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            webhook_path: format!("/webhooks/rmm/{}", integration.uuid),
            integration,
        }
    }
}

/// 字段映射预览
#[derive(Debug, Clone, Serialize)]
pub struct MappingPreview {
    pub detected: DetectedFields,
    pub severity: Option<Severity>,
    pub would_open_ticket: bool,
}

/// 按集成配置认证请求
///
/// 设置了 webhook_secret 时校验签名；否则校验 api_key；两者都没有时拒绝。
pub fn authenticate(
    integration: &rmm_integration::Model,
    credentials: &WebhookCredentials,
    body: &[u8],
) -> Result<()> {
    let ok = if let Some(secret) = integration.webhook_secret.as_deref() {
        credentials
            .signature
            .as_deref()
            .is_some_and(|sig| verify_hex_signature(secret, body, sig))
    } else if let Some(key) = integration.api_key.as_deref() {
        credentials
            .api_key
            .as_deref()
            .is_some_and(|given| constant_time_eq(given, key))
    } else {
        false
    };

    if ok {
        Ok(())
    } else {
        Err(NestogyError::unauthorized("Invalid webhook credentials"))
    }
}

/// 告警严重级别；缺失或无法识别时按 medium 处理
pub fn alert_severity(fields: &DetectedFields) -> Severity {
    fields
        .severity
        .as_deref()
        .and_then(Severity::parse_lenient)
        .unwrap_or(Severity::Medium)
}

pub fn ticket_priority(severity: Severity) -> TicketPriority {
    match severity {
        Severity::Critical => TicketPriority::Critical,
        Severity::High => TicketPriority::High,
        Severity::Medium => TicketPriority::Medium,
        Severity::Low | Severity::Info => TicketPriority::Low,
    }
}

/// 按操作系统名粗略推断资产类型
pub fn guess_asset_type(os: Option<&str>) -> AssetType {
    match os.map(str::to_ascii_lowercase) {
        Some(os) if os.contains("server") => AssetType::Server,
        Some(os) if os.contains("ios") || os.contains("android") => AssetType::Mobile,
        Some(os) if os.contains("mac") => AssetType::Laptop,
        Some(_) => AssetType::Workstation,
        None => AssetType::Other,
    }
}

fn ticket_subject(fields: &DetectedFields, asset_name: Option<&str>) -> String {
    let kind = fields.alert_type.as_deref().unwrap_or("Alert");
    let target = asset_name
        .or(fields.hostname.as_deref())
        .or(fields.device_id.as_deref())
        .unwrap_or("unknown device");
    let subject = format!("[RMM] {} on {}", kind, target);
    subject.chars().take(SUBJECT_MAX_CHARS).collect()
}

fn payload_object(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(NestogyError::validation("Payload must be a JSON object")),
    }
}

pub struct RmmService {
    storage: Arc<SeaOrmStorage>,
    events: Arc<EventBus>,
    tickets: Arc<TicketService>,
    jobs: JobQueue,
    /// uuid → 集成
    integrations: Cache<String, rmm_integration::Model>,
}

impl RmmService {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        events: Arc<EventBus>,
        tickets: Arc<TicketService>,
        jobs: JobQueue,
    ) -> Self {
        let integrations = Cache::builder()
            .max_capacity(INTEGRATION_CACHE_CAPACITY)
            .time_to_live(INTEGRATION_CACHE_TTL)
            .build();
        Self {
            storage,
            events,
            tickets,
            jobs,
            integrations,
        }
    }

    // ----------------------------------------------------------------
    // 集成管理
    // ----------------------------------------------------------------

    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<IntegrationView>> {
        ctx.require_admin()?;
        let rows = rmm_integration::Entity::find_in_tenant(ctx.company_id)
            .order_by_asc(rmm_integration::Column::Name)
            .all(self.storage.get_db())
            .await?;
        Ok(rows.into_iter().map(IntegrationView::from).collect())
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<IntegrationView> {
        ctx.require_admin()?;
        let found = find_scoped::<rmm_integration::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        Ok(found.into())
    }

    pub async fn create(&self, ctx: &TenantContext, input: IntegrationInput) -> Result<IntegrationView> {
        ctx.require_admin()?;
        let mut errors = FieldErrorsBuilder::new();
        let name = non_empty(input.name.clone());
        if name.is_none() {
            errors.add("name", "is required");
        }
        let vendor = match input.vendor.as_deref() {
            Some(v) => errors.capture("vendor", parse_field::<RmmVendor>("vendor", v)),
            None => Some(RmmVendor::Generic),
        };
        let severity = match input.ticket_min_severity.as_deref() {
            Some(s) => errors.capture("ticket_min_severity", parse_field::<Severity>("ticket_min_severity", s)),
            None => Some(Severity::High),
        };
        let api_key = input.api_key.clone().flatten().and_then(|k| non_empty(Some(k)));
        let webhook_secret = input.webhook_secret.clone().flatten().and_then(|s| non_empty(Some(s)));
        if api_key.is_none() && webhook_secret.is_none() {
            errors.add("webhook_secret", "either webhook_secret or api_key is required");
        }
        let mappings = match input.field_mappings.clone().flatten() {
            Some(raw) => errors.capture("field_mappings", parse_mappings(&raw)).map(|m| Some(serialize_mappings(&m))),
            None => Some(None),
        };
        errors.finish()?;

        let default_client_id = input.default_client_id.flatten();
        if let Some(client_id) = default_client_id {
            self.ensure_client(ctx.company_id, client_id).await?;
        }

        let now = Utc::now();
        let created = rmm_integration::ActiveModel {
            company_id: Set(ctx.company_id),
            uuid: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.unwrap_or_default()),
            vendor: Set(vendor.unwrap_or(RmmVendor::Generic).to_string()),
            api_key: Set(api_key),
            webhook_secret: Set(webhook_secret),
            default_client_id: Set(default_client_id),
            auto_create_assets: Set(input.auto_create_assets.unwrap_or(false)),
            ticket_min_severity: Set(severity.unwrap_or(Severity::High).to_string()),
            field_mappings: Set(mappings.flatten()),
            is_active: Set(input.is_active.unwrap_or(true)),
            last_received_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!(
            "RmmService: created integration '{}' ({}) for company {}",
            created.name, created.uuid, ctx.company_id
        );
        Ok(created.into())
    }

    pub async fn update(&self, ctx: &TenantContext, id: i32, input: IntegrationInput) -> Result<IntegrationView> {
        ctx.require_admin()?;
        let db = self.storage.get_db();
        let existing = find_scoped::<rmm_integration::Entity, _>(db, ctx.company_id, id).await?;

        let mut errors = FieldErrorsBuilder::new();
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.add("name", "is required");
        }
        let vendor = input
            .vendor
            .as_deref()
            .and_then(|v| errors.capture("vendor", parse_field::<RmmVendor>("vendor", v)));
        let severity = input.ticket_min_severity.as_deref().and_then(|s| {
            errors.capture("ticket_min_severity", parse_field::<Severity>("ticket_min_severity", s))
        });
        let api_key = input.api_key.clone().map(|k| k.and_then(|k| non_empty(Some(k))));
        let webhook_secret = input
            .webhook_secret
            .clone()
            .map(|s| s.and_then(|s| non_empty(Some(s))));
        let final_key = api_key.clone().unwrap_or_else(|| existing.api_key.clone());
        let final_secret = webhook_secret
            .clone()
            .unwrap_or_else(|| existing.webhook_secret.clone());
        if final_key.is_none() && final_secret.is_none() {
            errors.add("webhook_secret", "either webhook_secret or api_key is required");
        }
        let mappings = match input.field_mappings.clone() {
            Some(Some(raw)) => errors
                .capture("field_mappings", parse_mappings(&raw))
                .map(|m| Some(serialize_mappings(&m))),
            Some(None) => Some(None),
            None => None,
        };
        errors.finish()?;

        if let Some(Some(client_id)) = input.default_client_id {
            self.ensure_client(ctx.company_id, client_id).await?;
        }

        let uuid = existing.uuid.clone();
        let mut model: rmm_integration::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(vendor) = vendor {
            model.vendor = Set(vendor.to_string());
        }
        if let Some(severity) = severity {
            model.ticket_min_severity = Set(severity.to_string());
        }
        if let Some(key) = api_key {
            model.api_key = Set(key);
        }
        if let Some(secret) = webhook_secret {
            model.webhook_secret = Set(secret);
        }
        if let Some(client) = input.default_client_id {
            model.default_client_id = Set(client);
        }
        if let Some(auto) = input.auto_create_assets {
            model.auto_create_assets = Set(auto);
        }
        if let Some(mappings) = mappings {
            model.field_mappings = Set(mappings);
        }
        if let Some(active) = input.is_active {
            model.is_active = Set(active);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;

        self.integrations.invalidate(&uuid).await;
        debug!("RmmService: integration {} updated, cache invalidated", uuid);
        Ok(updated.into())
    }

    pub async fn delete(&self, ctx: &TenantContext, id: i32) -> Result<()> {
        ctx.require_admin()?;
        let db = self.storage.get_db();
        let existing = find_scoped::<rmm_integration::Entity, _>(db, ctx.company_id, id).await?;
        let uuid = existing.uuid.clone();

        // 资产保留，只解除与集成的关联
        asset::Entity::update_many()
            .col_expr(asset::Column::RmmIntegrationId, Expr::value(Option::<i32>::None))
            .col_expr(asset::Column::RmmDeviceId, Expr::value(Option::<String>::None))
            .filter(asset::Column::RmmIntegrationId.eq(id))
            .exec(db)
            .await?;
        existing.delete(db).await?;
        self.integrations.invalidate(&uuid).await;

        info!("RmmService: deleted integration {}", uuid);
        Ok(())
    }

    /// 对样例负载执行字段识别，不落库
    pub async fn preview(&self, ctx: &TenantContext, id: i32, sample: &Value) -> Result<MappingPreview> {
        ctx.require_admin()?;
        let integration = find_scoped::<rmm_integration::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        let payload = sample
            .as_object()
            .ok_or_else(|| NestogyError::invalid_field("payload", "must be a JSON object"))?;
        let mappings = detect::stored_mappings(integration.field_mappings.as_deref());
        let detected = detect_fields(payload, &mappings);
        let min = parse_field::<Severity>("ticket_min_severity", &integration.ticket_min_severity)?;
        let severity = detected.has_alert().then(|| alert_severity(&detected));
        Ok(MappingPreview {
            would_open_ticket: severity.is_some_and(|s| s >= min),
            severity,
            detected,
        })
    }

    // ----------------------------------------------------------------
    // Webhook 接收
    // ----------------------------------------------------------------

    /// 按 uuid 查找启用的集成（带缓存）
    async fn find_active(&self, uuid: &str) -> Result<rmm_integration::Model> {
        let cached = self.integrations.get(uuid).await;
        let integration = match cached {
            Some(found) => found,
            None => {
                let found = rmm_integration::Entity::find()
                    .filter(rmm_integration::Column::Uuid.eq(uuid))
                    .one(self.storage.get_db())
                    .await?
                    .ok_or_else(|| NestogyError::not_found("Integration not found"))?;
                self.integrations.insert(uuid.to_string(), found.clone()).await;
                found
            }
        };
        if !integration.is_active {
            return Err(NestogyError::not_found("Integration not found"));
        }
        Ok(integration)
    }

    /// 接收 RMM webhook：认证、解析、去重、入队
    pub async fn receive(
        &self,
        uuid: &str,
        credentials: &WebhookCredentials,
        body: &[u8],
    ) -> Result<WebhookReceipt> {
        let integration = self.find_active(uuid).await?;
        authenticate(&integration, credentials, body)?;
        let payload = payload_object(body)?;

        let mappings = detect::stored_mappings(integration.field_mappings.as_deref());
        let fields = detect_fields(&payload, &mappings);
        let external_id = fields.event_id.clone().unwrap_or_else(|| sha256_hex(body));
        let source = rmm_source(integration.id);
        let raw = String::from_utf8_lossy(body);

        let db = self.storage.get_db();
        let (event, duplicate) = webhook_events::record_event(
            db,
            self.storage.retry_config(),
            NewWebhookEvent {
                company_id: Some(integration.company_id),
                source: &source,
                external_id: &external_id,
                event_type: fields.alert_type.clone(),
                payload: &raw,
            },
        )
        .await?;

        rmm_integration::Entity::update_many()
            .col_expr(rmm_integration::Column::LastReceivedAt, Expr::value(Utc::now()))
            .filter(rmm_integration::Column::Id.eq(integration.id))
            .exec(db)
            .await?;

        if duplicate {
            return Ok(WebhookReceipt {
                event_id: event.id,
                duplicate: true,
            });
        }

        // 入队失败时事件保持 pending，重启后会重新入队
        self.jobs.try_enqueue(Job::ProcessRmmEvent { event_id: event.id })?;
        debug!(
            "RmmService: accepted event {} ({}) from integration {}",
            event.id, external_id, integration.uuid
        );
        Ok(WebhookReceipt {
            event_id: event.id,
            duplicate: false,
        })
    }

    // ----------------------------------------------------------------
    // 后台处理
    // ----------------------------------------------------------------

    /// ProcessRmmEvent：匹配或创建资产、更新在线信息、按严重级别开单
    pub async fn process_event(&self, event_id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let event = webhook_events::load_event(db, event_id).await?;
        if event.status == crate::models::WebhookEventStatus::Processed.as_ref() {
            debug!("RmmService: event {} already processed", event_id);
            return Ok(());
        }
        webhook_events::begin_attempt(db, event_id).await?;

        match self.apply_event(&event).await {
            Ok(()) => webhook_events::mark_processed(db, event_id).await,
            Err(e) => {
                webhook_events::mark_failed(db, event_id, &e).await?;
                Err(e)
            }
        }
    }

    async fn apply_event(&self, event: &webhook_event::Model) -> Result<()> {
        let db = self.storage.get_db();
        let integration_id = parse_rmm_source(&event.source).ok_or_else(|| {
            NestogyError::integration(format!("Event {} is not an RMM event", event.id))
        })?;
        let integration = rmm_integration::Entity::find_by_id(integration_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                NestogyError::integration(format!("Integration {} no longer exists", integration_id))
            })?;

        let payload = payload_object(event.payload.as_bytes())?;
        let mappings = detect::stored_mappings(integration.field_mappings.as_deref());
        let fields = detect_fields(&payload, &mappings);

        let asset = match self.match_asset(&integration, &fields).await? {
            Some(found) => Some(self.touch_asset(&integration, found, &fields).await?),
            None => self.auto_create_asset(&integration, &fields).await?,
        };

        if !fields.has_alert() {
            return Ok(());
        }
        let severity = alert_severity(&fields);
        let min = Severity::parse_lenient(&integration.ticket_min_severity).unwrap_or(Severity::High);
        if severity < min {
            debug!(
                "RmmService: event {} severity {} below threshold {}",
                event.id, severity, min
            );
            return Ok(());
        }

        let client_id = asset
            .as_ref()
            .map(|a| a.client_id)
            .or(integration.default_client_id);
        let Some(client_id) = client_id else {
            warn!(
                "RmmService: alert in event {} has no asset or default client, no ticket opened",
                event.id
            );
            return Ok(());
        };

        let ticket = self
            .tickets
            .open(
                integration.company_id,
                NewTicket {
                    client_id,
                    asset_id: asset.as_ref().map(|a| a.id),
                    subject: ticket_subject(&fields, asset.as_ref().map(|a| a.name.as_str())),
                    description: fields.message.clone(),
                    status: TicketStatus::New,
                    priority: ticket_priority(severity),
                    source: TicketSource::Rmm,
                    assignee_id: None,
                    created_by: None,
                },
            )
            .await?;
        info!(
            "RmmService: opened ticket #{} from event {} ({})",
            ticket.number, event.id, severity
        );
        Ok(())
    }

    /// 先按 (集成, 设备 id) 查找，再按主机名查找
    async fn match_asset(
        &self,
        integration: &rmm_integration::Model,
        fields: &DetectedFields,
    ) -> Result<Option<asset::Model>> {
        let db = self.storage.get_db();
        if let Some(device_id) = fields.device_id.as_deref() {
            let found = asset::Entity::find_in_tenant(integration.company_id)
                .filter(asset::Column::RmmIntegrationId.eq(integration.id))
                .filter(asset::Column::RmmDeviceId.eq(device_id))
                .one(db)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        if let Some(hostname) = fields.hostname.as_deref() {
            let found = asset::Entity::find_in_tenant(integration.company_id)
                .filter(asset::Column::Hostname.eq(hostname))
                .order_by_asc(asset::Column::Id)
                .one(db)
                .await?;
            return Ok(found);
        }
        Ok(None)
    }

    /// 更新 last_seen_at、IP、操作系统；按主机名匹配到的资产顺便绑定设备 id
    async fn touch_asset(
        &self,
        integration: &rmm_integration::Model,
        found: asset::Model,
        fields: &DetectedFields,
    ) -> Result<asset::Model> {
        let link_device = found.rmm_device_id.is_none() && fields.device_id.is_some();
        let mut model: asset::ActiveModel = found.into();
        model.last_seen_at = Set(Some(Utc::now()));
        if let Some(ip) = valid_ip(fields.ip_address.as_deref()) {
            model.ip_address = Set(Some(ip));
        }
        if let Some(os) = fields.os.clone() {
            model.os = Set(Some(os));
        }
        if link_device {
            model.rmm_integration_id = Set(Some(integration.id));
            model.rmm_device_id = Set(fields.device_id.clone());
        }
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.storage.get_db()).await?)
    }

    async fn auto_create_asset(
        &self,
        integration: &rmm_integration::Model,
        fields: &DetectedFields,
    ) -> Result<Option<asset::Model>> {
        if !integration.auto_create_assets {
            return Ok(None);
        }
        let Some(client_id) = integration.default_client_id else {
            warn!(
                "RmmService: integration {} auto-creates assets but has no default client",
                integration.uuid
            );
            return Ok(None);
        };
        let Some(name) = fields.hostname.clone().or_else(|| fields.device_id.clone()) else {
            return Ok(None);
        };

        let now = Utc::now();
        let created = asset::ActiveModel {
            company_id: Set(integration.company_id),
            client_id: Set(client_id),
            name: Set(name),
            asset_type: Set(guess_asset_type(fields.os.as_deref()).to_string()),
            serial_number: Set(fields.serial_number.clone()),
            hostname: Set(fields.hostname.clone()),
            ip_address: Set(valid_ip(fields.ip_address.as_deref())),
            os: Set(fields.os.clone()),
            status: Set(AssetStatus::Active.to_string()),
            support_status: Set(SupportStatus::Pending.to_string()),
            support_contract_id: Set(None),
            rmm_integration_id: Set(Some(integration.id)),
            rmm_device_id: Set(fields.device_id.clone()),
            last_seen_at: Set(Some(now)),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!(
            "RmmService: auto-created asset {} '{}' from integration {}",
            created.id, created.name, integration.uuid
        );
        self.events
            .publish(DomainEvent::AssetCreated {
                company_id: created.company_id,
                asset_id: created.id,
            })
            .await;
        Ok(Some(created))
    }

    async fn ensure_client(&self, company_id: i32, client_id: i32) -> Result<()> {
        client::Entity::find_in_tenant(company_id)
            .filter(client::Column::Id.eq(client_id))
            .one(self.storage.get_db())
            .await?
            .map(|_| ())
            .ok_or_else(|| NestogyError::invalid_field("default_client_id", "does not exist"))
    }
}

fn valid_ip(raw: Option<&str>) -> Option<String> {
    raw.and_then(|ip| ip.parse::<IpAddr>().ok()).map(|ip| ip.to_string())
}

fn serialize_mappings(mappings: &FieldMappings) -> String {
    let obj: Map<String, Value> = mappings
        .iter()
        .map(|(field, path)| (field.as_ref().to_string(), Value::String(path.clone())))
        .collect();
    Value::Object(obj).to_string()
}
