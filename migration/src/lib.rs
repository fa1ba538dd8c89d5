pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260301_000001_tenancy;
mod m20260301_000002_crm;
mod m20260301_000003_assets_contracts;
mod m20260301_000004_tickets_kb;
mod m20260301_000005_billing;
mod m20260301_000006_integrations;
mod m20260301_000007_email_accounts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_tenancy::Migration),
            Box::new(m20260301_000002_crm::Migration),
            Box::new(m20260301_000003_assets_contracts::Migration),
            Box::new(m20260301_000004_tickets_kb::Migration),
            Box::new(m20260301_000005_billing::Migration),
            Box::new(m20260301_000006_integrations::Migration),
            Box::new(m20260301_000007_email_accounts::Migration),
        ]
    }
}
