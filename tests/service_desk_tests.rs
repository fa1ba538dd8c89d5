//! Tickets, knowledge base and reporting tests

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::{Datelike, Duration, Utc};
use serde_json::{Value, json};

use common::{ADMIN_PASSWORD, TestEnv, bearer};
use nestogy::errors::NestogyError;
use nestogy::services::TenantContext;
use nestogy::services::assets::AssetInput;
use nestogy::services::clients::ClientInput;
use nestogy::services::contracts::ContractInput;
use nestogy::services::invoices::{InvoiceInput, InvoiceItemInput};
use nestogy::services::kb::ArticleInput;
use nestogy::services::reports::QuarterQuery;
use nestogy::services::tickets::TicketInput;
use nestogy::services::time_entries::TimeEntryInput;

async fn client(env: &TestEnv, ctx: &TenantContext, name: &str) -> i32 {
    env.services
        .clients
        .create(
            ctx,
            ClientInput {
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

async fn asset(env: &TestEnv, ctx: &TenantContext, client_id: i32, name: &str, asset_type: &str) -> i32 {
    env.services
        .assets
        .create(
            ctx,
            AssetInput {
                client_id: Some(client_id),
                name: Some(name.to_string()),
                asset_type: Some(asset_type.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

fn ticket(client_id: i32, subject: &str) -> TicketInput {
    TicketInput {
        client_id: Some(client_id),
        subject: Some(subject.to_string()),
        ..Default::default()
    }
}

fn article(title: &str) -> ArticleInput {
    ArticleInput {
        title: Some(title.to_string()),
        body: Some("Open the client, enter the gateway, connect.".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ticket_numbers_are_sequential_per_company() {
    let env = TestEnv::new().await;
    let acme = env.company("Acme MSP", "admin@acme.test").await;
    let globex = env.company("Globex IT", "admin@globex.test").await;
    let initech = client(&env, &acme, "Initech").await;
    let hooli = client(&env, &globex, "Hooli").await;
    let tickets = &env.services.tickets;

    let mut numbers = Vec::new();
    for subject in ["Printer jam", "VPN down", "New hire laptop"] {
        numbers.push(tickets.create(&acme, ticket(initech, subject)).await.unwrap().number);
    }
    assert_eq!(numbers, vec![1, 2, 3]);

    // 另一个租户从 1 开始
    let other = tickets.create(&globex, ticket(hooli, "Email bounce")).await.unwrap();
    assert_eq!(other.number, 1);

    // 删除中间的工单不影响 max + 1
    let second = tickets
        .list(&acme, &Default::default(), &Default::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|t| t.number == 2)
        .unwrap();
    tickets.delete(&acme, second.id).await.unwrap();
    let next = tickets.create(&acme, ticket(initech, "Backup failed")).await.unwrap();
    assert_eq!(next.number, 4);
}

#[tokio::test]
async fn test_ticket_rejects_asset_of_another_client() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &ctx, "Initech").await;
    let hooli = client(&env, &ctx, "Hooli").await;
    let hooli_server = asset(&env, &ctx, hooli, "HOOLI-FS01", "server").await;

    let mut input = ticket(initech, "Disk almost full");
    input.asset_id = Some(Some(hooli_server));
    let err = env.services.tickets.create(&ctx, input).await.unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));
    assert!(err.field_errors().expect("field errors").contains_key("asset_id"));

    let initech_server = asset(&env, &ctx, initech, "FS01", "server").await;
    let mut input = ticket(initech, "Disk almost full");
    input.asset_id = Some(Some(initech_server));
    let created = env.services.tickets.create(&ctx, input).await.unwrap();
    assert_eq!(created.asset_id, Some(initech_server));
}

#[actix_rt::test]
async fn test_ticket_with_foreign_asset_is_422_over_http() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &ctx, "Initech").await;
    let hooli = client(&env, &ctx, "Hooli").await;
    let hooli_server = asset(&env, &ctx, hooli, "HOOLI-FS01", "server").await;
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::post()
        .uri("/api/v1/tickets")
        .insert_header(bearer(&token))
        .set_json(json!({ "client_id": initech, "asset_id": hooli_server, "subject": "Disk full" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["asset_id"].is_array());
}

#[tokio::test]
async fn test_kb_slugs_are_deduplicated() {
    let env = TestEnv::new().await;
    let acme = env.company("Acme MSP", "admin@acme.test").await;
    let globex = env.company("Globex IT", "admin@globex.test").await;
    let kb = &env.services.kb;

    let first = kb.create(&acme, article("VPN Setup")).await.unwrap();
    let second = kb.create(&acme, article("VPN setup!")).await.unwrap();
    let third = kb.create(&acme, article("vpn  SETUP")).await.unwrap();
    assert_eq!(first.slug, "vpn-setup");
    assert_eq!(second.slug, "vpn-setup-2");
    assert_eq!(third.slug, "vpn-setup-3");

    // slug 在租户内唯一
    let other = kb.create(&globex, article("VPN Setup")).await.unwrap();
    assert_eq!(other.slug, "vpn-setup");

    // 删除后释放的 slug 可以重新使用；改标题时排除自身
    kb.delete(&acme, first.id).await.unwrap();
    let renamed = kb
        .update(
            &acme,
            third.id,
            ArticleInput {
                title: Some("VPN Setup".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.slug, "vpn-setup");
}

#[actix_rt::test]
async fn test_kb_view_count_increments_on_get() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let created = env.services.kb.create(&ctx, article("Reset MFA")).await.unwrap();
    assert_eq!(created.view_count, 0);
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    for expected in 1..=2 {
        let req = TestRequest::get()
            .uri(&format!("/api/v1/kb/articles/{}", created.id))
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["view_count"], expected);
    }

    // 列表不计入浏览
    let req = TestRequest::get()
        .uri("/api/v1/kb/articles")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let stored = env.services.kb.get(&ctx, created.id).await.unwrap();
    assert_eq!(stored.view_count, 3);
}

#[tokio::test]
async fn test_quarterly_business_review() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &ctx, "Initech").await;
    let hooli = client(&env, &ctx, "Hooli").await;
    let today = Utc::now().date_naive();
    let quarter = (today.month() - 1) / 3 + 1;

    let contract = env
        .services
        .contracts
        .create(
            &ctx,
            ContractInput {
                client_id: Some(initech),
                name: Some("Managed Services".to_string()),
                status: Some("active".to_string()),
                start_date: Some(today - Duration::days(400)),
                monthly_value_cents: Some(150_000),
                covered_asset_types: Some(vec!["server".to_string()]),
                auto_assign_assets: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    asset(&env, &ctx, initech, "FS01", "server").await;
    asset(&env, &ctx, initech, "LT-PETER", "laptop").await;
    asset(&env, &ctx, hooli, "HOOLI-FS01", "server").await;

    let tickets = &env.services.tickets;
    tickets.create(&ctx, ticket(initech, "Printer jam")).await.unwrap();
    let mut resolved = ticket(initech, "Password reset");
    resolved.status = Some("resolved".to_string());
    tickets.create(&ctx, resolved).await.unwrap();
    tickets.create(&ctx, ticket(hooli, "Not counted")).await.unwrap();

    let entry = |minutes: i32, billable: bool| TimeEntryInput {
        client_id: Some(initech),
        work_date: Some(today),
        minutes: Some(minutes),
        description: Some("Maintenance".to_string()),
        billable: Some(billable),
        ..Default::default()
    };
    env.services.time_entries.create(&ctx, entry(90, true)).await.unwrap();
    env.services.time_entries.create(&ctx, entry(30, false)).await.unwrap();

    let invoices = &env.services.invoices;
    let invoice = |cents: i64| InvoiceInput {
        client_id: Some(initech),
        issue_date: Some(today),
        due_date: Some(today + Duration::days(30)),
        tax_rate_bp: Some(0),
        items: Some(vec![InvoiceItemInput {
            description: "Managed services".to_string(),
            quantity: 1,
            unit_price_cents: cents,
        }]),
        ..Default::default()
    };
    let sent = invoices.create(&ctx, invoice(150_000)).await.unwrap();
    invoices.transition(&ctx, sent.invoice.id, "sent").await.unwrap();
    let paid = invoices.create(&ctx, invoice(40_000)).await.unwrap();
    invoices.transition(&ctx, paid.invoice.id, "sent").await.unwrap();
    invoices.transition(&ctx, paid.invoice.id, "paid").await.unwrap();
    // 草稿不计入
    invoices.create(&ctx, invoice(999)).await.unwrap();

    let report = env
        .services
        .reports
        .qbr(
            &ctx,
            initech,
            QuarterQuery {
                year: Some(today.year()),
                quarter: Some(quarter),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.client_name, "Initech");
    assert_eq!(report.period.quarter, quarter);
    assert!(report.period.start <= today && today <= report.period.end);
    assert_eq!(report.tickets_opened, 2);
    assert_eq!(report.tickets_resolved, 1);
    assert_eq!(report.open_tickets, 1);
    assert_eq!(report.billable_minutes, 90);
    assert_eq!(report.non_billable_minutes, 30);
    assert_eq!(report.invoiced_cents, 190_000);
    assert_eq!(report.paid_cents, 40_000);
    assert_eq!(report.assets_by_support_status["supported"], 1);
    assert_eq!(report.assets_by_support_status["unsupported"], 1);
    assert_eq!(report.active_contracts.len(), 1);
    assert_eq!(report.active_contracts[0].id, contract.id);

    let err = env
        .services
        .reports
        .qbr(
            &ctx,
            initech,
            QuarterQuery {
                year: Some(today.year()),
                quarter: Some(5),
            },
        )
        .await
        .unwrap_err();
    assert!(err.field_errors().expect("field errors").contains_key("quarter"));
}

#[actix_rt::test]
async fn test_dashboard_and_qbr_over_http() {
    let env = TestEnv::new().await;
    let acme = env.company("Acme MSP", "admin@acme.test").await;
    let globex = env.company("Globex IT", "admin@globex.test").await;
    let initech = client(&env, &acme, "Initech").await;
    client(&env, &acme, "Hooli").await;
    let umbrella = client(&env, &globex, "Umbrella").await;
    asset(&env, &acme, initech, "LT-PETER", "laptop").await;
    env.services.tickets.create(&acme, ticket(initech, "VPN down")).await.unwrap();
    env.services.tickets.create(&globex, ticket(umbrella, "Other tenant")).await.unwrap();
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::get()
        .uri("/api/v1/reports/dashboard")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["clients"], 2);
    assert_eq!(body["data"]["open_tickets"], 1);
    assert_eq!(body["data"]["unsupported_assets"], 1);
    assert_eq!(body["data"]["draft_invoices"], 0);
    assert_eq!(body["data"]["pending_webhook_events"], 0);

    let req = TestRequest::get()
        .uri(&format!("/api/v1/reports/clients/{}/qbr?year=2026&quarter=1", initech))
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["period"]["start"], "2026-01-01");
    assert_eq!(body["data"]["period"]["end"], "2026-03-31");

    // 其它租户的客户不可见
    let req = TestRequest::get()
        .uri(&format!("/api/v1/reports/clients/{}/qbr", umbrella))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
