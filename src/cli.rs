//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// Nestogy - multi-tenant back office for Managed Service Providers
#[derive(Parser)]
#[command(name = "nestogy")]
#[command(version)]
#[command(about = "Multi-tenant back office for Managed Service Providers", long_about = None)]
pub struct Cli {
    /// Configuration file (default: config.toml, or $NESTOGY_CONFIG)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Create a company (tenant) and its first admin user
    CreateCompany {
        /// Company name
        #[arg(long)]
        name: String,

        /// ISO 4217 currency code
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Admin display name
        #[arg(long)]
        admin_name: String,

        /// Admin login email
        #[arg(long)]
        admin_email: String,

        /// Admin password (if not provided, will prompt interactively)
        #[arg(long)]
        password: Option<String>,

        /// Read password from stdin (for scripting)
        #[arg(long)]
        stdin: bool,
    },

    /// Import clients from a CSV file
    ImportClients {
        /// Company id
        #[arg(long)]
        company: i32,

        /// Input file path
        file_path: String,

        /// What to do with existing clients: skip, overwrite, error
        #[arg(long, default_value = "skip")]
        mode: String,
    },

    /// Export clients to a CSV file
    ExportClients {
        /// Company id
        #[arg(long)]
        company: i32,

        /// Output file path (default: clients_<timestamp>.csv)
        file_path: Option<String>,
    },

    /// Import assets from a CSV file
    ImportAssets {
        /// Company id
        #[arg(long)]
        company: i32,

        /// Input file path
        file_path: String,

        /// What to do with existing assets: skip, overwrite, error
        #[arg(long, default_value = "skip")]
        mode: String,
    },

    /// Export assets to a CSV file
    ExportAssets {
        /// Company id
        #[arg(long)]
        company: i32,

        /// Output file path (default: assets_<timestamp>.csv)
        file_path: Option<String>,
    },

    /// Mark active contracts past their end date as expired
    ExpireContracts {
        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Configuration management commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },
}
