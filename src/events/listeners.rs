//! 启动时注册的默认监听器
//!
//! 同一事件的监听器按注册顺序执行：合同自动关联必须先于支持状态计算，
//! 这样新资产的支持状态能看到刚建立的关联。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::{DomainEvent, EventHandler, EventType};
use crate::errors::Result;
use crate::services::AppServices;
use crate::services::contracts::ContractService;
use crate::services::support::SupportEvaluator;

/// AssetCreated → 关联到自动分配的生效合同
pub struct ContractAutomationListener {
    contracts: Arc<ContractService>,
}

impl ContractAutomationListener {
    pub fn new(contracts: Arc<ContractService>) -> Self {
        Self { contracts }
    }
}

#[async_trait::async_trait]
impl EventHandler for ContractAutomationListener {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if let DomainEvent::AssetCreated {
            company_id,
            asset_id,
        } = event
        {
            let today = Utc::now().date_naive();
            self.contracts
                .auto_attach_asset(*company_id, *asset_id, today)
                .await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "contract_automation"
    }

    fn interested_events(&self) -> Vec<EventType> {
        vec![EventType::AssetCreated]
    }
}

/// 资产或合同变化 → 重新计算支持状态
pub struct AssetSupportStatusListener {
    evaluator: Arc<SupportEvaluator>,
}

impl AssetSupportStatusListener {
    pub fn new(evaluator: Arc<SupportEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait::async_trait]
impl EventHandler for AssetSupportStatusListener {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        let today = Utc::now().date_naive();
        match event {
            DomainEvent::AssetCreated {
                company_id,
                asset_id,
            }
            | DomainEvent::AssetUpdated {
                company_id,
                asset_id,
            } => {
                let status = self
                    .evaluator
                    .evaluate_asset(*company_id, *asset_id, today)
                    .await?;
                debug!("Asset {} support status: {:?}", asset_id, status);
            }
            DomainEvent::ContractChanged {
                company_id,
                client_id,
                ..
            } => {
                self.evaluator
                    .evaluate_client(*company_id, *client_id, today)
                    .await?;
            }
            DomainEvent::TicketCreated { .. } => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "asset_support_status"
    }

    fn interested_events(&self) -> Vec<EventType> {
        vec![
            EventType::AssetCreated,
            EventType::AssetUpdated,
            EventType::ContractChanged,
        ]
    }
}

/// TicketCreated 的挂载点，目前只记日志
pub struct TicketCreatedLogger;

#[async_trait::async_trait]
impl EventHandler for TicketCreatedLogger {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if let DomainEvent::TicketCreated {
            company_id,
            ticket_id,
            client_id,
        } = event
        {
            info!(
                "Ticket {} created for client {} (company {})",
                ticket_id, client_id, company_id
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ticket_created_logger"
    }

    fn interested_events(&self) -> Vec<EventType> {
        vec![EventType::TicketCreated]
    }
}

/// 注册默认监听器（顺序有意义）
pub fn register_default_listeners(services: &AppServices) {
    let bus = &services.events;
    bus.register_handler(Arc::new(ContractAutomationListener::new(
        services.contracts.clone(),
    )));
    bus.register_handler(Arc::new(AssetSupportStatusListener::new(
        services.support.clone(),
    )));
    bus.register_handler(Arc::new(TicketCreatedLogger));
}
