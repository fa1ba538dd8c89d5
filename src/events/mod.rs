//! 领域事件总线
//!
//! 服务层在写库成功后发布事件，监听器在独立任务中执行，
//! 监听器失败只记录日志，不影响触发它的请求。

mod bus;
pub mod listeners;

pub use bus::{DispatchMode, EventBus};

use serde::Serialize;

use crate::errors::Result;

/// 事件类型，用于监听器订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
    AssetCreated,
    AssetUpdated,
    ContractChanged,
    TicketCreated,
}

/// 领域事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AssetCreated {
        company_id: i32,
        asset_id: i32,
    },
    /// 资产的客户或类型发生变化
    AssetUpdated {
        company_id: i32,
        asset_id: i32,
    },
    ContractChanged {
        company_id: i32,
        contract_id: i32,
        client_id: i32,
    },
    TicketCreated {
        company_id: i32,
        ticket_id: i32,
        client_id: i32,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::AssetCreated { .. } => EventType::AssetCreated,
            DomainEvent::AssetUpdated { .. } => EventType::AssetUpdated,
            DomainEvent::ContractChanged { .. } => EventType::ContractChanged,
            DomainEvent::TicketCreated { .. } => EventType::TicketCreated,
        }
    }
}

/// 事件处理器
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<()>;

    fn name(&self) -> &str;

    fn interested_events(&self) -> Vec<EventType>;
}
