//! Contract automation and asset support status
//!
//! 事件同步分发，服务调用返回时监听器已经执行完毕。

mod common;

use chrono::{Duration, NaiveDate, Utc};

use common::TestEnv;
use nestogy::errors::NestogyError;
use nestogy::services::TenantContext;
use nestogy::services::assets::AssetInput;
use nestogy::services::clients::ClientInput;
use nestogy::services::contracts::ContractInput;

fn today() -> NaiveDate {
    Utc::now().date_naive()
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

fn asset_input(client_id: i32, name: &str, asset_type: &str) -> AssetInput {
    AssetInput {
        client_id: Some(client_id),
        name: Some(name.to_string()),
        asset_type: Some(asset_type.to_string()),
        ..Default::default()
    }
}

fn active_contract(client_id: i32, types: &[&str], auto_assign: bool) -> ContractInput {
    ContractInput {
        client_id: Some(client_id),
        name: Some("Managed Services".to_string()),
        status: Some("active".to_string()),
        start_date: Some(today() - Duration::days(30)),
        end_date: None,
        monthly_value_cents: Some(150_000),
        covered_asset_types: Some(types.iter().map(|t| t.to_string()).collect()),
        auto_assign_assets: Some(auto_assign),
    }
}

#[tokio::test]
async fn test_new_asset_is_auto_assigned_and_supported() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let contract = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &["server"], true))
        .await
        .unwrap();

    let server = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "FS01", "server"))
        .await
        .unwrap();
    let laptop = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "LT-PETER", "laptop"))
        .await
        .unwrap();

    let attached = env.services.contracts.list_assets(&ctx, contract.id).await.unwrap();
    assert_eq!(attached.iter().map(|a| a.id).collect::<Vec<_>>(), vec![server.id]);

    let server = env.services.assets.get(&ctx, server.id).await.unwrap();
    assert_eq!(server.support_status, "supported");
    assert_eq!(server.support_contract_id, Some(contract.id));

    let laptop = env.services.assets.get(&ctx, laptop.id).await.unwrap();
    assert_eq!(laptop.support_status, "unsupported");
    assert_eq!(laptop.support_contract_id, None);
}

#[tokio::test]
async fn test_draft_contract_does_not_support() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let mut draft = active_contract(client_id, &[], true);
    draft.status = None;
    let contract = env.services.contracts.create(&ctx, draft).await.unwrap();
    assert_eq!(contract.status, "draft");

    let server = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "FS01", "server"))
        .await
        .unwrap();
    let server = env.services.assets.get(&ctx, server.id).await.unwrap();
    assert_eq!(server.support_status, "unsupported");

    // 合同激活后，客户资产重新计算
    env.services
        .contracts
        .update(
            &ctx,
            contract.id,
            ContractInput {
                status: Some("active".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let server = env.services.assets.get(&ctx, server.id).await.unwrap();
    assert_eq!(server.support_status, "supported");
    assert_eq!(server.support_contract_id, Some(contract.id));
}

#[tokio::test]
async fn test_terminating_contract_removes_support() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let contract = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &[], false))
        .await
        .unwrap();
    let server = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "FS01", "server"))
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, server.id).await.unwrap().support_status,
        "supported"
    );

    env.services
        .contracts
        .update(
            &ctx,
            contract.id,
            ContractInput {
                status: Some("terminated".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let server = env.services.assets.get(&ctx, server.id).await.unwrap();
    assert_eq!(server.support_status, "unsupported");
    assert_eq!(server.support_contract_id, None);

    // terminated 是终态
    let err = env
        .services
        .contracts
        .update(
            &ctx,
            contract.id,
            ContractInput {
                status: Some("active".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));
}

#[tokio::test]
async fn test_explicit_attachment_overrides_coverage() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let broad = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &[], false))
        .await
        .unwrap();
    let printers = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &["printer"], false))
        .await
        .unwrap();
    let server = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "FS01", "server"))
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, server.id).await.unwrap().support_contract_id,
        Some(broad.id)
    );

    env.services
        .contracts
        .attach_asset(&ctx, printers.id, server.id)
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, server.id).await.unwrap().support_contract_id,
        Some(printers.id)
    );

    env.services
        .contracts
        .detach_asset(&ctx, printers.id, server.id)
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, server.id).await.unwrap().support_contract_id,
        Some(broad.id)
    );
}

#[tokio::test]
async fn test_attach_rejects_asset_of_other_client() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let initech = client(&env, &ctx, "Initech").await;
    let hooli = client(&env, &ctx, "Hooli").await;

    let contract = env
        .services
        .contracts
        .create(&ctx, active_contract(initech, &[], false))
        .await
        .unwrap();
    let foreign = env
        .services
        .assets
        .create(&ctx, asset_input(hooli, "HOOLI-01", "server"))
        .await
        .unwrap();

    let err = env
        .services
        .contracts
        .attach_asset(&ctx, contract.id, foreign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NestogyError::InvalidFields(_)));
}

#[tokio::test]
async fn test_asset_type_change_reevaluates_support() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    env.services
        .contracts
        .create(&ctx, active_contract(client_id, &["server"], false))
        .await
        .unwrap();

    let asset = env
        .services
        .assets
        .create(&ctx, asset_input(client_id, "BOX", "workstation"))
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, asset.id).await.unwrap().support_status,
        "unsupported"
    );

    env.services
        .assets
        .update(
            &ctx,
            asset.id,
            AssetInput {
                asset_type: Some("server".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        env.services.assets.get(&ctx, asset.id).await.unwrap().support_status,
        "supported"
    );
}

#[tokio::test]
async fn test_expire_ended_contracts() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;

    let mut ended = active_contract(client_id, &[], false);
    ended.start_date = Some(today() - Duration::days(400));
    ended.end_date = Some((today() - Duration::days(1)).format("%Y-%m-%d").to_string());
    let ended = env.services.contracts.create(&ctx, ended).await.unwrap();
    let running = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &[], false))
        .await
        .unwrap();

    let expired = env.services.contracts.expire_ended(today()).await.unwrap();
    assert_eq!(expired.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ended.id]);

    assert_eq!(
        env.services.contracts.get(&ctx, ended.id).await.unwrap().status,
        "expired"
    );
    assert_eq!(
        env.services.contracts.get(&ctx, running.id).await.unwrap().status,
        "active"
    );

    // 再次执行没有可过期的合同
    assert!(env.services.contracts.expire_ended(today()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_active_contract_cannot_be_deleted() {
    let env = TestEnv::new().await;
    let ctx = env.company("Acme MSP", "admin@acme.test").await;
    let client_id = client(&env, &ctx, "Initech").await;
    let contract = env
        .services
        .contracts
        .create(&ctx, active_contract(client_id, &[], false))
        .await
        .unwrap();

    let err = env.services.contracts.delete(&ctx, contract.id).await.unwrap_err();
    assert!(matches!(err, NestogyError::Validation(_)));
}
