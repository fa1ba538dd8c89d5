use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info_span};

use super::{DomainEvent, EventHandler, EventType};

/// 分发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// 在新任务中执行监听器，`publish` 立即返回（服务器模式）
    Spawn,
    /// `publish` 等待全部监听器执行完毕（CLI 与测试）
    Inline,
}

pub struct EventBus {
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    mode: DispatchMode,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl EventBus {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            mode,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// 注册处理器；同一事件的处理器按注册顺序执行
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write();
        for event_type in handler.interested_events() {
            handlers
                .entry(event_type)
                .or_default()
                .push(handler.clone());
        }
        debug!("Registered event handler '{}'", handler.name());
    }

    fn handlers_for(&self, event_type: EventType) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// 发布事件
    pub async fn publish(&self, event: DomainEvent) {
        match self.mode {
            DispatchMode::Inline => self.dispatch_and_wait(event).await,
            DispatchMode::Spawn => {
                let handlers = self.handlers_for(event.event_type());
                if handlers.is_empty() {
                    return;
                }
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                let in_flight = self.in_flight.clone();
                let idle = self.idle.clone();
                let span = info_span!("event", kind = ?event.event_type());
                tokio::spawn(
                    async move {
                        run_handlers(&handlers, &event).await;
                        if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                            idle.notify_waiters();
                        }
                    }
                    .instrument(span),
                );
            }
        }
    }

    /// 同步执行全部监听器
    pub async fn dispatch_and_wait(&self, event: DomainEvent) {
        let handlers = self.handlers_for(event.event_type());
        run_handlers(&handlers, &event).await;
    }

    /// 等待所有已派发的后台监听器结束
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_handlers(handlers: &[Arc<dyn EventHandler>], event: &DomainEvent) {
    for handler in handlers {
        if let Err(e) = handler.handle(event).await {
            error!(
                "Event handler '{}' failed on {:?}: {}",
                handler.name(),
                event.event_type(),
                e
            );
        }
    }
}
