//! CLI command implementations

mod company;
mod config_gen;
mod csv_transfer;
mod maintenance;

pub use company::create_company;
pub use config_gen::config_generate;
pub use csv_transfer::{export_assets, export_clients, import_assets, import_clients};
pub use maintenance::{expire_contracts, run_migrations};
