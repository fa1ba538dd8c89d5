//! CLI mode
//!
//! Parses arguments with clap and delegates to the command implementations.

use clap::Parser;

use crate::cli::Cli;
use crate::interfaces::cli::{CliError, run_cli_command};

/// Run CLI mode
///
/// `args` is the full argument list, including `-c/--config`
/// (clap accepts it as a global flag; the config is already loaded).
pub async fn run_cli(args: Vec<String>) -> Result<(), CliError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    run_cli_command(cli.command).await
}
