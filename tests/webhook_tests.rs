//! RMM and PostGrid webhook ingestion tests

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{Value, json};

use common::{POSTGRID_SECRET, TestEnv};
use migration::entities::{physical_mail_order, webhook_event};
use nestogy::errors::NestogyError;
use nestogy::jobs::{Job, requeue_pending_events};
use nestogy::services::TenantContext;
use nestogy::services::clients::ClientInput;
use nestogy::services::mail::MailOrderInput;
use nestogy::services::rmm::{IntegrationInput, IntegrationView, WebhookCredentials};
use nestogy::services::tickets::TicketFilter;
use nestogy::utils::signature::sign_hex;

const RMM_SECRET: &str = "rmm-shared-secret";

async fn client(env: &TestEnv, ctx: &TenantContext, name: &str) -> i32 {
    env.services
        .clients
        .create(
            ctx,
            ClientInput {
                name: Some(name.to_string()),
                address: Some("1 Initech Way".to_string()),
                city: Some("Austin".to_string()),
                postal_code: Some("73301".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

async fn integration(env: &TestEnv, ctx: &TenantContext, default_client: i32) -> IntegrationView {
    env.services
        .rmm
        .create(
            ctx,
            IntegrationInput {
                name: Some("NinjaOne".to_string()),
                vendor: Some("ninjaone".to_string()),
                webhook_secret: Some(Some(RMM_SECRET.to_string())),
                default_client_id: Some(Some(default_client)),
                auto_create_assets: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

fn signed(body: &[u8]) -> WebhookCredentials {
    WebhookCredentials {
        signature: Some(format!("sha256={}", sign_hex(RMM_SECRET, body))),
        api_key: None,
    }
}

#[tokio::test]
async fn test_integration_view_hides_secrets() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;

    assert!(view.has_webhook_secret);
    assert!(!view.has_api_key);
    assert_eq!(
        view.webhook_path,
        format!("/webhooks/rmm/{}", view.integration.uuid)
    );
    assert_eq!(view.integration.ticket_min_severity, "high");

    let json = serde_json::to_value(&view).unwrap();
    assert!(json.get("webhook_secret").is_none() || json["webhook_secret"].is_null());
}

#[tokio::test]
async fn test_integration_requires_credentials() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;

    let err = env
        .services
        .rmm
        .create(
            &ctx,
            IntegrationInput {
                name: Some("Datto".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.field_errors().unwrap().contains_key("webhook_secret"));
}

#[tokio::test]
async fn test_rmm_alert_creates_asset_and_ticket() {
    let mut env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;

    let body = serde_json::to_vec(&json!({
        "event_id": "evt-1001",
        "device": {
            "device_id": "dev-42",
            "hostname": "FS01",
            "os": "Windows Server 2022",
            "ip_address": "10.0.0.5"
        },
        "alert": {
            "alert_type": "disk_space",
            "severity": "critical",
            "message": "C: drive below 5% free"
        }
    }))
    .unwrap();

    let receipt = env
        .services
        .rmm
        .receive(&view.integration.uuid, &signed(&body), &body)
        .await
        .unwrap();
    assert!(!receipt.duplicate);

    // 同一事件再次投递只返回原记录
    let again = env
        .services
        .rmm
        .receive(&view.integration.uuid, &signed(&body), &body)
        .await
        .unwrap();
    assert!(again.duplicate);
    assert_eq!(again.event_id, receipt.event_id);

    assert_eq!(env.run_queued_jobs().await, 1);

    let assets = env
        .services
        .assets
        .list(&ctx, &Default::default(), &Default::default())
        .await
        .unwrap();
    assert_eq!(assets.total, 1);
    let asset = &assets.items[0];
    assert_eq!(asset.name, "FS01");
    assert_eq!(asset.asset_type, "server");
    assert_eq!(asset.rmm_device_id.as_deref(), Some("dev-42"));
    assert_eq!(asset.client_id, client_id);

    let tickets = env
        .services
        .tickets
        .list(&ctx, &TicketFilter::default(), &Default::default())
        .await
        .unwrap();
    assert_eq!(tickets.total, 1);
    let ticket = &tickets.items[0];
    assert_eq!(ticket.priority, "critical");
    assert_eq!(ticket.source, "rmm");
    assert_eq!(ticket.asset_id, Some(asset.id));

    let event = webhook_event::Entity::find_by_id(receipt.event_id)
        .one(env.services.storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "processed");
    assert_eq!(event.attempts, 1);

    // 重复处理同一事件不会再开单
    env.services.rmm.process_event(receipt.event_id).await.unwrap();
    let tickets = env
        .services
        .tickets
        .list(&ctx, &TicketFilter::default(), &Default::default())
        .await
        .unwrap();
    assert_eq!(tickets.total, 1);
}

#[tokio::test]
async fn test_low_severity_alert_only_updates_asset() {
    let mut env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;

    // 没有 severity 时按 medium 处理，低于默认阈值 high
    let body = br#"{"device_id":"dev-7","hostname":"LT-PETER","alert_type":"patch_pending"}"#;
    env.services
        .rmm
        .receive(&view.integration.uuid, &signed(body), body)
        .await
        .unwrap();
    env.run_queued_jobs().await;

    let tickets = env
        .services
        .tickets
        .list(&ctx, &TicketFilter::default(), &Default::default())
        .await
        .unwrap();
    assert_eq!(tickets.total, 0);

    let assets = env
        .services
        .assets
        .list(&ctx, &Default::default(), &Default::default())
        .await
        .unwrap();
    assert_eq!(assets.total, 1);
    assert!(assets.items[0].last_seen_at.is_some());
}

#[tokio::test]
async fn test_rmm_rejects_bad_signature_and_unknown_integration() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;

    let body = br#"{"event_id":"evt-1","hostname":"FS01"}"#;
    let forged = WebhookCredentials {
        signature: Some(sign_hex("wrong-secret", body)),
        api_key: None,
    };
    let err = env
        .services
        .rmm
        .receive(&view.integration.uuid, &forged, body)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Unauthorized(_)));

    // 只提供 api key 对配置了签名密钥的集成无效
    let key_only = WebhookCredentials {
        signature: None,
        api_key: Some(RMM_SECRET.to_string()),
    };
    let err = env
        .services
        .rmm
        .receive(&view.integration.uuid, &key_only, body)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Unauthorized(_)));

    let err = env
        .services
        .rmm
        .receive("00000000-0000-0000-0000-000000000000", &signed(body), body)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::NotFound(_)));
}

#[tokio::test]
async fn test_event_id_falls_back_to_body_hash() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;

    let body = br#"{"hostname":"FS01"}"#;
    let first = env
        .services
        .rmm
        .receive(&view.integration.uuid, &signed(body), body)
        .await
        .unwrap();
    let second = env
        .services
        .rmm
        .receive(&view.integration.uuid, &signed(body), body)
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(first.event_id, second.event_id);
}

#[actix_rt::test]
async fn test_rmm_webhook_over_http() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;
    let app = test_app!(env);
    let uri = format!("/webhooks/rmm/{}", view.integration.uuid);

    let body = br#"{"event_id":"evt-http","hostname":"FS01","severity":"high"}"#.to_vec();
    let req = TestRequest::post()
        .uri(&uri)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Webhook-Signature", sign_hex(RMM_SECRET, &body)))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = test::read_body_json(resp).await;
    assert!(json["data"]["event_id"].is_number());

    let req = TestRequest::post()
        .uri(&uri)
        .insert_header(("X-Webhook-Signature", "deadbeef"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_postgrid_status_updates_mail_order() {
    let mut env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let order = env
        .services
        .mail
        .create(
            &ctx,
            MailOrderInput {
                client_id: Some(client_id),
                description: Some("March statement".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(order.status, "pending");
    assert_eq!(order.address_line1, "1 Initech Way");
    assert_eq!(order.country, "US");
    assert_eq!(
        env.jobs.try_recv().unwrap(),
        Job::SubmitMailOrder { order_id: order.id }
    );

    // 模拟已提交到 PostGrid
    let mut model: physical_mail_order::ActiveModel = order.clone().into();
    model.provider_id = Set(Some("letter_abc123".to_string()));
    model.status = Set("submitted".to_string());
    model.updated_at = Set(Utc::now());
    model.update(env.services.storage.get_db()).await.unwrap();

    let body = serde_json::to_vec(&json!({
        "id": "evt_pg_1",
        "type": "letter.updated",
        "data": { "id": "letter_abc123", "status": "in_transit", "trackingNumber": "9400-1111" }
    }))
    .unwrap();

    let err = env
        .services
        .mail
        .receive_webhook(Some("bad"), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Unauthorized(_)));

    let signature = sign_hex(POSTGRID_SECRET, &body);
    let receipt = env
        .services
        .mail
        .receive_webhook(Some(&signature), &body)
        .await
        .unwrap();
    assert!(!receipt.duplicate);
    let duplicate = env
        .services
        .mail
        .receive_webhook(Some(&signature), &body)
        .await
        .unwrap();
    assert!(duplicate.duplicate);

    assert_eq!(env.run_queued_jobs().await, 1);
    let updated = env.services.mail.get(&ctx, order.id).await.unwrap();
    assert_eq!(updated.status, "in_transit");
    assert_eq!(updated.tracking_number.as_deref(), Some("9400-1111"));
    assert!(updated.last_event_at.is_some());
}

#[tokio::test]
async fn test_cancel_pending_mail_order() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let order = env
        .services
        .mail
        .create(
            &ctx,
            MailOrderInput {
                client_id: Some(client_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 尚未提交到 PostGrid 的订单只在本地取消
    let cancelled = env.services.mail.cancel(&ctx, order.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let err = env.services.mail.cancel(&ctx, order.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
}

async fn event_status(env: &TestEnv, external_id: &str) -> String {
    webhook_event::Entity::find()
        .filter(webhook_event::Column::ExternalId.eq(external_id))
        .one(env.services.storage.get_db())
        .await
        .unwrap()
        .expect("event should be recorded")
        .status
}

async fn submitted_order(env: &mut TestEnv, ctx: &TenantContext, provider_id: &str) -> i32 {
    let client_id = client(env, ctx, "Initech").await;
    let order = env
        .services
        .mail
        .create(
            ctx,
            MailOrderInput {
                client_id: Some(client_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    while env.jobs.try_recv().is_ok() {}
    let mut model: physical_mail_order::ActiveModel = order.clone().into();
    model.provider_id = Set(Some(provider_id.to_string()));
    model.status = Set("submitted".to_string());
    model.updated_at = Set(Utc::now());
    model.update(env.services.storage.get_db()).await.unwrap();
    order.id
}

async fn postgrid_event(env: &TestEnv, event_id: &str, letter_id: &str, status: &str) {
    let body = serde_json::to_vec(&json!({
        "id": event_id,
        "type": "letter.updated",
        "data": { "id": letter_id, "status": status }
    }))
    .unwrap();
    let signature = sign_hex(POSTGRID_SECRET, &body);
    env.services
        .mail
        .receive_webhook(Some(&signature), &body)
        .await
        .unwrap();
}

#[actix_rt::test]
async fn test_full_queue_returns_503_and_keeps_event_pending() {
    let mut env = TestEnv::with_queue_capacity(1).await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let view = integration(&env, &ctx, client_id).await;
    env.services
        .jobs
        .try_enqueue(Job::SubmitMailOrder { order_id: 4242 })
        .unwrap();
    let app = test_app!(env);

    let body = br#"{"event_id":"evt-busy","hostname":"FS01","severity":"high"}"#.to_vec();
    let req = TestRequest::post()
        .uri(&format!("/webhooks/rmm/{}", view.integration.uuid))
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Webhook-Signature", sign_hex(RMM_SECRET, &body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(event_status(&env, "evt-busy").await, "pending");

    // 重启后回填：pending 事件重新入队并处理
    assert_eq!(
        env.jobs.try_recv().unwrap(),
        Job::SubmitMailOrder { order_id: 4242 }
    );
    assert_eq!(requeue_pending_events(&env.services).await.unwrap(), 1);
    assert_eq!(env.run_queued_jobs().await, 1);
    assert_eq!(event_status(&env, "evt-busy").await, "processed");
}

#[tokio::test]
async fn test_unsubmitted_order_is_requeued_and_can_be_resubmitted() {
    let mut env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let order = env
        .services
        .mail
        .create(
            &ctx,
            MailOrderInput {
                client_id: Some(client_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // 模拟进程在任务执行前退出
    assert_eq!(
        env.jobs.try_recv().unwrap(),
        Job::SubmitMailOrder { order_id: order.id }
    );
    assert!(env.jobs.try_recv().is_err());

    assert_eq!(requeue_pending_events(&env.services).await.unwrap(), 1);
    assert_eq!(
        env.jobs.try_recv().unwrap(),
        Job::SubmitMailOrder { order_id: order.id }
    );

    let resubmitted = env.services.mail.resubmit(&ctx, order.id).await.unwrap();
    assert_eq!(resubmitted.status, "pending");
    assert_eq!(
        env.jobs.try_recv().unwrap(),
        Job::SubmitMailOrder { order_id: order.id }
    );

    // 已提交或已取消的订单不能重新提交
    let mut model: physical_mail_order::ActiveModel = order.clone().into();
    model.provider_id = Set(Some("letter_done".to_string()));
    model.status = Set("submitted".to_string());
    model.update(env.services.storage.get_db()).await.unwrap();
    let err = env.services.mail.resubmit(&ctx, order.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
    assert_eq!(requeue_pending_events(&env.services).await.unwrap(), 0);
}

#[tokio::test]
async fn test_late_status_does_not_reopen_delivered_order() {
    let mut env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let order_id = submitted_order(&mut env, &ctx, "letter_final").await;

    postgrid_event(&env, "evt_delivered", "letter_final", "delivered").await;
    postgrid_event(&env, "evt_late", "letter_final", "in_transit").await;
    assert_eq!(env.run_queued_jobs().await, 2);

    let order = env.services.mail.get(&ctx, order_id).await.unwrap();
    assert_eq!(order.status, "delivered");
    // 迟到的事件被忽略，但仍标记为已处理
    assert_eq!(event_status(&env, "evt_late").await, "processed");
}
