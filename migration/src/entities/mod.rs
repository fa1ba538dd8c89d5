pub mod asset;
pub mod client;
pub mod company;
pub mod contact;
pub mod contract;
pub mod contract_asset;
pub mod email_account;
pub mod employee_time_entry;
pub mod failed_job;
pub mod invoice;
pub mod invoice_item;
pub mod kb_article;
pub mod physical_mail_order;
pub mod rate_card;
pub mod rmm_integration;
pub mod ticket;
pub mod time_entry;
pub mod user;
pub mod webhook_event;

pub use asset::Entity as AssetEntity;
pub use client::Entity as ClientEntity;
pub use company::Entity as CompanyEntity;
pub use contact::Entity as ContactEntity;
pub use contract::Entity as ContractEntity;
pub use contract_asset::Entity as ContractAssetEntity;
pub use email_account::Entity as EmailAccountEntity;
pub use employee_time_entry::Entity as EmployeeTimeEntryEntity;
pub use failed_job::Entity as FailedJobEntity;
pub use invoice::Entity as InvoiceEntity;
pub use invoice_item::Entity as InvoiceItemEntity;
pub use kb_article::Entity as KbArticleEntity;
pub use physical_mail_order::Entity as PhysicalMailOrderEntity;
pub use rate_card::Entity as RateCardEntity;
pub use rmm_integration::Entity as RmmIntegrationEntity;
pub use ticket::Entity as TicketEntity;
pub use time_entry::Entity as TimeEntryEntity;
pub use user::Entity as UserEntity;
pub use webhook_event::Entity as WebhookEventEntity;
