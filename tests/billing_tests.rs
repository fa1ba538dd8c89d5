//! Time tracking, invoicing and payroll export tests

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::{Value, json};

use common::{ADMIN_PASSWORD, TestEnv, bearer};
use nestogy::errors::NestogyError;
use nestogy::models::Role;
use nestogy::services::TenantContext;
use nestogy::services::clients::ClientInput;
use migration::entities::invoice;
use nestogy::services::invoices::{
    AccountingExportQuery, GenerateFromTimeRequest, InvoiceInput, InvoiceItemInput, MAX_AMOUNT_CENTS,
};
use nestogy::services::rate_cards::RateCardInput;
use nestogy::services::tenancy::CreateUserRequest;
use nestogy::services::time_entries::TimeEntryInput;
use nestogy::services::timeclock::{ClockEntryUpdate, ClockInput};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

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

async fn technician(env: &TestEnv, admin: &TenantContext, email: &str) -> TenantContext {
    let user = env
        .services
        .auth
        .create_user(
            admin,
            CreateUserRequest {
                name: "Milton Waddams".to_string(),
                email: email.to_string(),
                password: "red-stapler-1".to_string(),
                role: "technician".to_string(),
            },
        )
        .await
        .unwrap();
    TenantContext::new(admin.company_id, user.id, Role::Technician)
}

fn submitted(client_id: i32, day: &str, minutes: i32) -> TimeEntryInput {
    TimeEntryInput {
        client_id: Some(client_id),
        work_date: Some(date(day)),
        minutes: Some(minutes),
        description: Some("Server maintenance".to_string()),
        status: Some("submitted".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_review_only_touches_submitted_entries() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let tech = technician(&env, &admin, "milton@acme.test").await;
    let client_id = client(&env, &admin, "Initech").await;

    let entries = &env.services.time_entries;
    let sub = entries.create(&tech, submitted(client_id, "2026-03-02", 60)).await.unwrap();
    let mut draft_input = submitted(client_id, "2026-03-03", 30);
    draft_input.status = None;
    let draft = entries.create(&tech, draft_input).await.unwrap();
    assert_eq!(draft.status, "draft");

    // 技术员不能审批
    let err = entries.approve(&tech, &[sub.id]).await.unwrap_err();
    assert!(matches!(err, NestogyError::Forbidden(_)));

    let result = entries.approve(&admin, &[sub.id, draft.id, 4242]).await.unwrap();
    assert_eq!(result.updated, vec![sub.id]);
    assert_eq!(result.skipped.len(), 2);

    // 已审批的记录不可再修改
    let err = entries
        .update(&tech, sub.id, submitted(client_id, "2026-03-02", 90))
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
}

#[tokio::test]
async fn test_invalid_time_entry_fields() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &admin, "Initech").await;

    let mut input = submitted(client_id, "2026-03-02", 0);
    input.status = Some("approved".to_string());
    let err = env.services.time_entries.create(&admin, input).await.unwrap_err();
    let fields = err.field_errors().expect("field errors");
    assert!(fields.contains_key("minutes"));
    assert!(fields.contains_key("status"));
}

#[tokio::test]
async fn test_generate_invoices_from_approved_time() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let hooli = client(&env, &admin, "Hooli").await;

    env.services
        .rate_cards
        .create(
            &admin,
            RateCardInput {
                client_id: Some(initech),
                name: Some("Standard".to_string()),
                hourly_rate_cents: Some(15_000),
                is_default: Some(true),
                is_active: Some(true),
            },
        )
        .await
        .unwrap();

    let entries = &env.services.time_entries;
    let a = entries.create(&admin, submitted(initech, "2026-03-02", 90)).await.unwrap();
    let b = entries.create(&admin, submitted(initech, "2026-03-03", 1)).await.unwrap();
    let c = entries.create(&admin, submitted(hooli, "2026-03-04", 60)).await.unwrap();
    let mut unbillable = submitted(initech, "2026-03-05", 45);
    unbillable.billable = Some(false);
    let d = entries.create(&admin, unbillable).await.unwrap();
    let outside = entries.create(&admin, submitted(initech, "2026-04-01", 30)).await.unwrap();
    entries
        .approve(&admin, &[a.id, b.id, c.id, d.id, outside.id])
        .await
        .unwrap();

    let generated = env
        .services
        .invoices
        .generate_from_time(
            &admin,
            GenerateFromTimeRequest {
                from: date("2026-03-01"),
                to: date("2026-03-31"),
                client_ids: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(generated.len(), 2);

    let initech_inv = generated.iter().find(|d| d.invoice.client_id == initech).unwrap();
    assert_eq!(initech_inv.invoice.status, "draft");
    assert_eq!(initech_inv.items.len(), 2);
    // 90 分钟 × 150.00 = 225.00；1 分钟 × 150.00 = 2.50
    assert_eq!(initech_inv.items[0].amount_cents, 22_500);
    assert_eq!(initech_inv.items[1].amount_cents, 250);
    assert_eq!(initech_inv.invoice.subtotal_cents, 22_750);
    assert_eq!(initech_inv.invoice.total_cents, 22_750);

    // 没有费率卡的客户使用配置的默认费率 120.00
    let hooli_inv = generated.iter().find(|d| d.invoice.client_id == hooli).unwrap();
    assert_eq!(hooli_inv.invoice.total_cents, 12_000);

    let year = Utc::now().format("%Y").to_string();
    let mut numbers: Vec<&str> = generated.iter().map(|d| d.invoice.number.as_str()).collect();
    numbers.sort();
    assert_eq!(
        numbers,
        vec![format!("INV-{}-00001", year), format!("INV-{}-00002", year)]
    );

    let a = entries.get(&admin, a.id).await.unwrap();
    assert_eq!(a.status, "invoiced");
    assert_eq!(a.invoice_id, Some(initech_inv.invoice.id));
    assert_eq!(entries.get(&admin, d.id).await.unwrap().invoice_id, None);
    assert_eq!(entries.get(&admin, outside.id).await.unwrap().invoice_id, None);

    // 再次生成不会重复开票
    let again = env
        .services
        .invoices
        .generate_from_time(
            &admin,
            GenerateFromTimeRequest {
                from: date("2026-03-01"),
                to: date("2026-03-31"),
                client_ids: None,
            },
        )
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_void_releases_time_entries() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;

    let entry = env
        .services
        .time_entries
        .create(&admin, submitted(initech, "2026-03-02", 60))
        .await
        .unwrap();
    env.services.time_entries.approve(&admin, &[entry.id]).await.unwrap();

    let request = || GenerateFromTimeRequest {
        from: date("2026-03-01"),
        to: date("2026-03-31"),
        client_ids: Some(vec![initech]),
    };
    let generated = env.services.invoices.generate_from_time(&admin, request()).await.unwrap();
    let invoice_id = generated[0].invoice.id;

    let invoices = &env.services.invoices;
    let sent = invoices.transition(&admin, invoice_id, "sent").await.unwrap();
    assert_eq!(sent.status, "sent");
    assert!(sent.sent_at.is_some());

    // sent 的发票不能回到 draft
    let err = invoices.transition(&admin, invoice_id, "draft").await.unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));

    invoices.transition(&admin, invoice_id, "void").await.unwrap();
    let released = env.services.time_entries.get(&admin, entry.id).await.unwrap();
    assert_eq!(released.status, "approved");
    assert_eq!(released.invoice_id, None);

    // 释放后的工时可以重新开票
    let regenerated = invoices.generate_from_time(&admin, request()).await.unwrap();
    assert_eq!(regenerated.len(), 1);
    assert_ne!(regenerated[0].invoice.id, invoice_id);

    // void 是终态
    let err = invoices.transition(&admin, invoice_id, "paid").await.unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));
}

#[tokio::test]
async fn test_manual_invoice_totals_and_paid_is_final() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;

    let invoices = &env.services.invoices;
    let detail = invoices
        .create(
            &admin,
            InvoiceInput {
                client_id: Some(initech),
                issue_date: Some(date("2026-03-01")),
                due_date: Some(date("2026-03-31")),
                tax_rate_bp: Some(825),
                items: Some(vec![
                    InvoiceItemInput {
                        description: "Firewall appliance".to_string(),
                        quantity: 2,
                        unit_price_cents: 49_999,
                    },
                    InvoiceItemInput {
                        description: "Setup".to_string(),
                        quantity: 1,
                        unit_price_cents: 5_000,
                    },
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.invoice.number, "INV-2026-00001");
    assert_eq!(detail.invoice.subtotal_cents, 104_998);
    // 104998 × 8.25% = 8662.335 → 8662
    assert_eq!(detail.invoice.tax_cents, 8_662);
    assert_eq!(detail.invoice.total_cents, 113_660);

    invoices.transition(&admin, detail.invoice.id, "sent").await.unwrap();
    invoices.transition(&admin, detail.invoice.id, "paid").await.unwrap();

    let err = invoices
        .update(
            &admin,
            detail.invoice.id,
            InvoiceInput {
                notes: Some("late edit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));

    let err = invoices.delete(&admin, detail.invoice.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
}

#[tokio::test]
async fn test_invoice_requires_items() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;

    let err = env
        .services
        .invoices
        .create(
            &admin,
            InvoiceInput {
                client_id: Some(initech),
                tax_rate_bp: Some(20_000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    let fields = err.field_errors().expect("field errors");
    assert!(fields.contains_key("items"));
    assert!(fields.contains_key("tax_rate_bp"));
}

#[tokio::test]
async fn test_timeclock_approval_and_payroll_export() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let tech = technician(&env, &admin, "milton@acme.test").await;
    let clock = &env.services.timeclock;

    clock.clock_in(&tech, ClockInput::default()).await.unwrap();
    // 重复打卡被拒绝
    let err = clock.clock_in(&tech, ClockInput::default()).await.unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));

    let entry = clock.clock_out(&tech, ClockInput::default()).await.unwrap();
    let entry = clock
        .update(
            &tech,
            entry.id,
            ClockEntryUpdate {
                clock_in: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()),
                clock_out: Some(Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap()),
                break_minutes: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(entry.total_minutes, Some(450));

    let err = clock.approve(&tech, entry.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Forbidden(_)));
    clock.approve(&admin, entry.id).await.unwrap();

    let export = clock
        .export_payroll(&admin, date("2026-03-01"), date("2026-03-07"))
        .await
        .unwrap();
    assert_eq!(export.entry_count, 1);
    assert_eq!(export.rows.len(), 1);
    assert_eq!(export.rows[0].user_id, tech.user_id);
    assert_eq!(export.rows[0].total_minutes, 450);
    assert_eq!(export.rows[0].total_hours, "7.50");
    assert!(export.csv.starts_with("user_id,name,email"));

    // 已导出的记录不再导出，也不能修改
    let again = clock
        .export_payroll(&admin, date("2026-03-01"), date("2026-03-07"))
        .await
        .unwrap();
    assert_eq!(again.entry_count, 0);
    let err = clock
        .update(&admin, entry.id, ClockEntryUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
}

#[actix_rt::test]
async fn test_payroll_export_csv_via_api() {
    let env = TestEnv::new().await;
    env.company("Acme MSP", "admin@acme.test").await;
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::post()
        .uri("/api/v1/payroll/export?format=csv")
        .insert_header(bearer(&token))
        .set_json(json!({ "from": "2026-03-01", "to": "2026-03-07" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("Content-Type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));

    let req = TestRequest::post()
        .uri("/api/v1/payroll/export")
        .insert_header(bearer(&token))
        .set_json(json!({ "from": "2026-03-07", "to": "2026-03-01" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["to"].is_array());
}

fn line(description: &str, quantity: i32, unit_price_cents: i64) -> InvoiceItemInput {
    InvoiceItemInput {
        description: description.to_string(),
        quantity,
        unit_price_cents,
    }
}

fn manual_invoice(client_id: i32, issue: &str, items: Vec<InvoiceItemInput>) -> InvoiceInput {
    InvoiceInput {
        client_id: Some(client_id),
        issue_date: Some(date(issue)),
        due_date: Some(date(issue) + Duration::days(30)),
        items: Some(items),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_huge_amounts_are_rejected_not_overflowed() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let invoices = &env.services.invoices;

    // quantity × unit price 超过 i64
    let err = invoices
        .create(
            &admin,
            manual_invoice(initech, "2026-03-01", vec![line("Gold plating", 2, i64::MAX / 2 + 1)]),
        )
        .await
        .unwrap_err();
    let fields = err.field_errors().expect("field errors");
    assert!(fields.contains_key("items.0.unit_price_cents"));

    // 单行合法，但合计超过上限
    let err = invoices
        .create(
            &admin,
            manual_invoice(
                initech,
                "2026-03-01",
                vec![
                    line("Half", 1, MAX_AMOUNT_CENTS),
                    line("Other half", 1, MAX_AMOUNT_CENTS),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert!(err.field_errors().expect("field errors").contains_key("items"));

    let err = env
        .services
        .rate_cards
        .create(
            &admin,
            RateCardInput {
                client_id: Some(initech),
                name: Some("Absurd".to_string()),
                hourly_rate_cents: Some(i64::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.field_errors().expect("field errors").contains_key("hourly_rate_cents"));

    // 最高费率 × 2 小时 超过金额上限，生成发票时报字段错误而不是 panic
    env.services
        .rate_cards
        .create(
            &admin,
            RateCardInput {
                client_id: Some(initech),
                name: Some("Ceiling".to_string()),
                hourly_rate_cents: Some(MAX_AMOUNT_CENTS),
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let entry = env
        .services
        .time_entries
        .create(&admin, submitted(initech, "2026-03-02", 120))
        .await
        .unwrap();
    env.services.time_entries.approve(&admin, &[entry.id]).await.unwrap();
    let err = invoices
        .generate_from_time(
            &admin,
            GenerateFromTimeRequest {
                from: date("2026-03-01"),
                to: date("2026-03-31"),
                client_ids: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));
    let entry = env.services.time_entries.get(&admin, entry.id).await.unwrap();
    assert_eq!(entry.invoice_id, None);
}

#[actix_rt::test]
async fn test_overflowing_invoice_is_422_over_http() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::post()
        .uri("/api/v1/invoices")
        .insert_header(bearer(&token))
        .set_json(json!({
            "client_id": initech,
            "items": [{ "description": "Gold plating", "quantity": 2, "unit_price_cents": i64::MAX / 2 + 1 }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_invoice_numbers_continue_past_five_digits() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let invoices = &env.services.invoices;

    let first = invoices
        .create(&admin, manual_invoice(initech, "2026-03-01", vec![line("Setup", 1, 100)]))
        .await
        .unwrap();
    let mut model: invoice::ActiveModel = first.invoice.into();
    model.number = Set("INV-2026-99999".to_string());
    model.update(env.services.storage.get_db()).await.unwrap();

    let next = invoices
        .create(&admin, manual_invoice(initech, "2026-03-02", vec![line("Setup", 1, 100)]))
        .await
        .unwrap();
    assert_eq!(next.invoice.number, "INV-2026-100000");
    // 字符串排序下 "99999" > "100000"，按序号取最大值才不会重复
    let after = invoices
        .create(&admin, manual_invoice(initech, "2026-03-03", vec![line("Setup", 1, 100)]))
        .await
        .unwrap();
    assert_eq!(after.invoice.number, "INV-2026-100001");
}

#[tokio::test]
async fn test_single_default_rate_card_per_client() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let hooli = client(&env, &admin, "Hooli").await;
    let cards = &env.services.rate_cards;

    let card = |client_id: i32, name: &str, rate: i64| RateCardInput {
        client_id: Some(client_id),
        name: Some(name.to_string()),
        hourly_rate_cents: Some(rate),
        is_default: Some(true),
        is_active: Some(true),
    };
    let standard = cards.create(&admin, card(initech, "Standard", 15_000)).await.unwrap();
    let after_hours = cards.create(&admin, card(initech, "After hours", 22_500)).await.unwrap();
    let other = cards.create(&admin, card(hooli, "Standard", 9_000)).await.unwrap();

    let defaults = |list: Vec<migration::entities::rate_card::Model>| {
        list.into_iter().filter(|c| c.is_default).map(|c| c.id).collect::<Vec<_>>()
    };
    assert_eq!(
        defaults(cards.list(&admin, Some(initech)).await.unwrap()),
        vec![after_hours.id]
    );
    // 其它客户的默认卡不受影响
    assert_eq!(defaults(cards.list(&admin, Some(hooli)).await.unwrap()), vec![other.id]);

    cards
        .update(
            &admin,
            standard.id,
            RateCardInput {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        defaults(cards.list(&admin, Some(initech)).await.unwrap()),
        vec![standard.id]
    );
    assert!(!cards.get(&admin, after_hours.id).await.unwrap().is_default);
}

#[tokio::test]
async fn test_payroll_export_includes_last_second_of_range() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let tech = technician(&env, &admin, "milton@acme.test").await;
    let clock = &env.services.timeclock;

    clock.clock_in(&tech, ClockInput::default()).await.unwrap();
    let entry = clock.clock_out(&tech, ClockInput::default()).await.unwrap();
    let late = Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 59).unwrap() + Duration::milliseconds(500);
    let entry = clock
        .update(
            &tech,
            entry.id,
            ClockEntryUpdate {
                clock_in: Some(late),
                clock_out: Some(late + Duration::minutes(45)),
                break_minutes: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    clock.approve(&admin, entry.id).await.unwrap();

    let export = clock
        .export_payroll(&admin, date("2026-03-01"), date("2026-03-07"))
        .await
        .unwrap();
    assert_eq!(export.entry_count, 1);
}

#[tokio::test]
async fn test_accounting_export_lists_sent_and_paid_lines() {
    let env = TestEnv::new().await;
    let admin = env.company("Acme MSP", "admin@acme.test").await;
    let tech = technician(&env, &admin, "milton@acme.test").await;
    let initech = client(&env, &admin, "Initech").await;
    let invoices = &env.services.invoices;

    let sent = invoices
        .create(
            &admin,
            manual_invoice(
                initech,
                "2026-03-05",
                vec![line("Firewall appliance", 2, 49_999), line("Setup", 1, 5_000)],
            ),
        )
        .await
        .unwrap();
    invoices.transition(&admin, sent.invoice.id, "sent").await.unwrap();
    // 草稿与区间外的发票不导出
    invoices
        .create(&admin, manual_invoice(initech, "2026-03-06", vec![line("Draft", 1, 100)]))
        .await
        .unwrap();
    let april = invoices
        .create(&admin, manual_invoice(initech, "2026-04-01", vec![line("April", 1, 100)]))
        .await
        .unwrap();
    invoices.transition(&admin, april.invoice.id, "sent").await.unwrap();

    let march = AccountingExportQuery {
        from: date("2026-03-01"),
        to: date("2026-03-31"),
    };
    let csv = invoices.export_accounting(&admin, &march).await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("invoice_number,client,issue_date"));
    assert!(lines[1].contains("Firewall appliance"));
    assert!(lines[1].contains("499.99"));
    assert!(lines[1].contains("1049.98"));
    assert!(lines[2].contains(",Setup,"));
    assert!(lines.iter().skip(1).all(|l| l.contains(&sent.invoice.number) && l.ends_with(",USD")));

    let err = invoices.export_accounting(&tech, &march).await.unwrap_err();
    assert!(matches!(err, NestogyError::Forbidden(_)));
    let backwards = AccountingExportQuery {
        from: date("2026-03-31"),
        to: date("2026-03-01"),
    };
    let err = invoices.export_accounting(&admin, &backwards).await.unwrap_err();
    assert!(err.field_errors().expect("field errors").contains_key("to"));
}

#[actix_rt::test]
async fn test_accounting_export_via_api() {
    let env = TestEnv::new().await;
    env.company("Acme MSP", "admin@acme.test").await;
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::get()
        .uri("/api/v1/invoices/export?from=2026-03-01&to=2026-03-31")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp
        .headers()
        .get("Content-Disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("invoices_"));
}
