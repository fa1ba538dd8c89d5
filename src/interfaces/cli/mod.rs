//! CLI interface module
//!
//! Commands run directly against the database; they do not talk to a
//! running server.

pub mod commands;

use std::fmt;

use crate::cli::{Commands, ConfigCommands};
use crate::errors::NestogyError;
use crate::runtime::lifetime::startup::prepare_cli_services;
use commands::{
    config_generate, create_company, expire_contracts, export_assets, export_clients,
    import_assets, import_clients, run_migrations,
};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<NestogyError> for CliError {
    fn from(err: NestogyError) -> Self {
        match err {
            NestogyError::DatabaseConfig(_)
            | NestogyError::DatabaseConnection(_)
            | NestogyError::DatabaseOperation(_) => CliError::StorageError(err.message().to_string()),
            // 字段错误拼进消息，终端上直接可读
            NestogyError::Validation(_)
            | NestogyError::InvalidFields(_)
            | NestogyError::DateParse(_)
            | NestogyError::Csv(_) => CliError::ParseError(err.format_simple()),
            other => CliError::CommandError(other.format_simple()),
        }
    }
}

/// Run a CLI command from clap-parsed input
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    // config generate 不需要数据库
    if let Commands::Config { action } = cmd {
        let ConfigCommands::Generate { output_path, force } = action;
        return config_generate(output_path, force).await;
    }

    let services = prepare_cli_services()
        .await
        .map_err(|e| CliError::StorageError(format!("{:#}", e)))?;

    match cmd {
        Commands::Migrate => run_migrations(&services).await,

        Commands::CreateCompany {
            name,
            currency,
            admin_name,
            admin_email,
            password,
            stdin,
        } => {
            create_company(
                &services,
                name,
                currency,
                admin_name,
                admin_email,
                password,
                stdin,
            )
            .await
        }

        Commands::ImportClients {
            company,
            file_path,
            mode,
        } => import_clients(&services, company, file_path, &mode).await,

        Commands::ExportClients { company, file_path } => {
            export_clients(&services, company, file_path).await
        }

        Commands::ImportAssets {
            company,
            file_path,
            mode,
        } => import_assets(&services, company, file_path, &mode).await,

        Commands::ExportAssets { company, file_path } => {
            export_assets(&services, company, file_path).await
        }

        Commands::ExpireContracts { date } => expire_contracts(&services, date).await,

        Commands::Config { .. } => unreachable!("handled above"),
    }
}
