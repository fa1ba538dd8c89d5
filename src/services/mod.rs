//! Service layer for business logic
//!
//! Services are shared between the HTTP API, the job worker and the CLI.
//! Each call receives the caller's [`TenantContext`] explicitly.

pub mod assets;
pub mod clients;
pub mod contracts;
pub mod invoices;
pub mod kb;
pub mod email_accounts;
pub mod mail;
pub mod notifications;
pub mod rate_cards;
pub mod reports;
pub mod rmm;
pub mod support;
pub mod tenancy;
pub mod tickets;
pub mod time_entries;
pub mod timeclock;
pub mod webhook_events;

pub use tenancy::{AuthService, AuthenticatedUser, TenantContext};

use std::sync::Arc;

use crate::config::get_config;
use crate::events::EventBus;
use crate::jobs::JobQueue;
use crate::storage::SeaOrmStorage;

/// 全部服务的集合，HTTP 层、后台任务和 CLI 共用
pub struct AppServices {
    pub storage: Arc<SeaOrmStorage>,
    pub events: Arc<EventBus>,
    pub jobs: JobQueue,
    pub auth: Arc<AuthService>,
    pub clients: Arc<clients::ClientService>,
    pub assets: Arc<assets::AssetService>,
    pub contracts: Arc<contracts::ContractService>,
    pub support: Arc<support::SupportEvaluator>,
    pub tickets: Arc<tickets::TicketService>,
    pub timeclock: Arc<timeclock::TimeClockService>,
    pub time_entries: Arc<time_entries::TimeEntryService>,
    pub rate_cards: Arc<rate_cards::RateCardService>,
    pub invoices: Arc<invoices::InvoiceService>,
    pub rmm: Arc<rmm::RmmService>,
    pub mail: Arc<mail::MailService>,
    pub notifications: Arc<notifications::NotificationService>,
    pub email_accounts: Arc<email_accounts::EmailAccountService>,
    pub kb: Arc<kb::KbService>,
    pub reports: Arc<reports::ReportService>,
}

impl AppServices {
    /// 构造所有服务（不注册事件监听器）
    pub fn new(storage: Arc<SeaOrmStorage>, events: Arc<EventBus>, jobs: JobQueue) -> Self {
        let tickets = Arc::new(tickets::TicketService::new(storage.clone(), events.clone()));
        Self {
            auth: Arc::new(AuthService::new(storage.clone())),
            clients: Arc::new(clients::ClientService::new(storage.clone())),
            assets: Arc::new(assets::AssetService::new(storage.clone(), events.clone())),
            contracts: Arc::new(contracts::ContractService::new(storage.clone(), events.clone())),
            support: Arc::new(support::SupportEvaluator::new(storage.clone())),
            timeclock: Arc::new(timeclock::TimeClockService::new(storage.clone())),
            time_entries: Arc::new(time_entries::TimeEntryService::new(storage.clone())),
            rate_cards: Arc::new(rate_cards::RateCardService::new(storage.clone())),
            invoices: Arc::new(invoices::InvoiceService::new(storage.clone())),
            rmm: Arc::new(rmm::RmmService::new(
                storage.clone(),
                events.clone(),
                tickets.clone(),
                jobs.clone(),
            )),
            mail: Arc::new(mail::MailService::new(storage.clone(), jobs.clone())),
            notifications: Arc::new(notifications::NotificationService::new(
                notifications::channel_from_config(&get_config().sms),
                jobs.clone(),
            )),
            email_accounts: Arc::new(email_accounts::EmailAccountService::new(
                storage.clone(),
                Arc::new(email_accounts::HttpTokenClient::from_config(&get_config().oauth)),
            )),
            kb: Arc::new(kb::KbService::new(storage.clone())),
            reports: Arc::new(reports::ReportService::new(storage.clone())),
            tickets,
            storage,
            events,
            jobs,
        }
    }

    /// 构造服务并注册领域事件监听器
    pub fn with_listeners(storage: Arc<SeaOrmStorage>, events: Arc<EventBus>, jobs: JobQueue) -> Arc<Self> {
        let services = Arc::new(Self::new(storage, events, jobs));
        crate::events::listeners::register_default_listeners(&services);
        services
    }
}
