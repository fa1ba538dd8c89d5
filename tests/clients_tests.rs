//! Client, contact and CSV import/export tests

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use serde_json::{Value, json};

use common::{ADMIN_PASSWORD, TestEnv, bearer};
use nestogy::errors::NestogyError;
use nestogy::services::clients::{ClientInput, ContactInput};
use nestogy::utils::csv_handler::ImportMode;

fn client_named(name: &str) -> ClientInput {
    ClientInput {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn contact(name: &str, primary: bool) -> ContactInput {
    ContactInput {
        name: Some(name.to_string()),
        is_primary: Some(primary),
        ..Default::default()
    }
}

#[actix_rt::test]
async fn test_create_client_via_api() {
    let env = TestEnv::new().await;
    env.company("Acme MSP", "admin@acme.test").await;
    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);

    let req = TestRequest::post()
        .uri("/api/v1/clients")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "Initech", "email": "Ops@Initech.test" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["name"], json!("Initech"));
    assert_eq!(body["data"]["email"], json!("ops@initech.test"));
    assert_eq!(body["data"]["status"], json!("active"));

    // 同一租户内名称唯一
    let req = TestRequest::post()
        .uri("/api/v1/clients")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "Initech" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["name"].is_array());
}

#[actix_rt::test]
async fn test_invalid_client_fields() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;

    let err = env
        .services
        .clients
        .create(
            &ctx,
            ClientInput {
                name: Some("Initech".to_string()),
                email: Some("not-an-email".to_string()),
                website: Some("ftp://initech.test".to_string()),
                status: Some("bogus".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    let fields = err.field_errors().expect("field errors");
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("website"));
    assert!(fields.contains_key("status"));
}

#[actix_rt::test]
async fn test_single_primary_contact() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let clients = &env.services.clients;
    let initech = clients.create(&ctx, client_named("Initech")).await.unwrap();

    let peter = clients
        .create_contact(&ctx, initech.id, contact("Peter Gibbons", true))
        .await
        .unwrap();
    let bill = clients
        .create_contact(&ctx, initech.id, contact("Bill Lumbergh", true))
        .await
        .unwrap();

    let listed = clients.list_contacts(&ctx, initech.id).await.unwrap();
    let primaries: Vec<i32> = listed.iter().filter(|c| c.is_primary).map(|c| c.id).collect();
    assert_eq!(primaries, vec![bill.id]);

    // 更新为主联系人后，之前的主联系人被清除
    clients
        .update_contact(
            &ctx,
            initech.id,
            peter.id,
            ContactInput {
                is_primary: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let listed = clients.list_contacts(&ctx, initech.id).await.unwrap();
    let primaries: Vec<i32> = listed.iter().filter(|c| c.is_primary).map(|c| c.id).collect();
    assert_eq!(primaries, vec![peter.id]);
}

#[actix_rt::test]
async fn test_contact_must_belong_to_client() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let clients = &env.services.clients;
    let initech = clients.create(&ctx, client_named("Initech")).await.unwrap();
    let hooli = clients.create(&ctx, client_named("Hooli")).await.unwrap();

    let peter = clients
        .create_contact(&ctx, initech.id, contact("Peter Gibbons", false))
        .await
        .unwrap();
    let err = clients
        .delete_contact(&ctx, hooli.id, peter.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::NotFound(_)));
}

#[actix_rt::test]
async fn test_delete_client_with_assets_is_blocked() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let initech = env
        .services
        .clients
        .create(&ctx, client_named("Initech"))
        .await
        .unwrap();
    env.services
        .assets
        .create(
            &ctx,
            nestogy::services::assets::AssetInput {
                client_id: Some(initech.id),
                name: Some("FS01".to_string()),
                asset_type: Some("server".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = env.services.clients.delete(&ctx, initech.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));

    // 没有关联数据的客户可以删除
    let empty = env
        .services
        .clients
        .create(&ctx, client_named("Hooli"))
        .await
        .unwrap();
    env.services.clients.delete(&ctx, empty.id).await.unwrap();
}

#[actix_rt::test]
async fn test_client_csv_import_modes() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let clients = &env.services.clients;
    clients.create(&ctx, client_named("Initech")).await.unwrap();

    let csv = b"name,email,city\n\
                Initech,it@initech.test,Austin\n\
                Hooli,ops@hooli.test,Palo Alto\n\
                ,missing@name.test,Nowhere\n\
                Pied Piper,bad-email,Palo Alto\n";

    let report = clients.import_csv(&ctx, csv, ImportMode::Skip).await.unwrap();
    assert_eq!(report.success, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors[0].row, 4);
    assert!(report.errors[1].message.contains("email"));

    let report = clients.import_csv(&ctx, csv, ImportMode::Overwrite).await.unwrap();
    assert_eq!(report.success, 2);
    let initech = clients
        .list(&ctx, &Default::default(), &Default::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|c| c.name == "Initech")
        .unwrap();
    assert_eq!(initech.city.as_deref(), Some("Austin"));

    let report = clients.import_csv(&ctx, csv, ImportMode::Error).await.unwrap();
    assert_eq!(report.success, 0);
    assert_eq!(report.failed, 4);
}

#[actix_rt::test]
async fn test_client_csv_export_via_api() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    env.services
        .clients
        .create(&ctx, client_named("Initech"))
        .await
        .unwrap();
    env.services
        .clients
        .create(&ctx, client_named("Hooli"))
        .await
        .unwrap();

    let app = test_app!(env);
    let token = login!(app, "admin@acme.test", ADMIN_PASSWORD);
    let req = TestRequest::get()
        .uri("/api/v1/clients/export")
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
    assert!(disposition.contains("attachment"));

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("name,email"));
    // 按名称排序
    assert!(lines.next().unwrap().starts_with("Hooli,"));
    assert!(lines.next().unwrap().starts_with("Initech,"));
}

#[actix_rt::test]
async fn test_asset_csv_round_trip_between_tenants() {
    let env = TestEnv::new().await;
    let acme = env.company("Acme MSP", "admin@acme.test").await;
    let globex = env.company("Globex IT", "admin@globex.test").await;
    for ctx in [&acme, &globex] {
        env.services
            .clients
            .create(ctx, client_named("Initech"))
            .await
            .unwrap();
    }

    let csv = b"name,asset_type,client,serial_number,hostname,ip_address,os,status\n\
                FS01,server,Initech,SN-1,fs01.initech.local,10.0.0.5,Windows Server 2022,active\n\
                LT-PETER,laptop,Initech,SN-2,,,,\n\
                ROUTER,toaster,Initech,,,,,\n\
                NAS,server,Unknown Co,,,,,\n";
    let report = env
        .services
        .assets
        .import_csv(&acme, csv, ImportMode::Skip)
        .await
        .unwrap();
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 2);

    let exported = env.services.assets.export_csv(&acme).await.unwrap();
    let report = env
        .services
        .assets
        .import_csv(&globex, exported.as_bytes(), ImportMode::Skip)
        .await
        .unwrap();
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 0);
}
