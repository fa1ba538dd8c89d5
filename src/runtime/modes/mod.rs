//! Mode routing
//!
//! - Server mode (HTTP server + job worker)
//! - CLI mode (clap subcommands)
//!
//! The mode selection is based on command-line arguments and feature flags.

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub use server::run_server;

#[cfg(feature = "cli")]
pub use cli::run_cli;

/// Mode detection result
#[derive(Debug, PartialEq)]
pub enum Mode {
    #[cfg(feature = "server")]
    Server,
    #[cfg(feature = "cli")]
    Cli,
    Unknown,
}

/// Detect which mode to run based on command-line arguments
///
/// `args` must already have `-c/--config` removed
/// (see [`crate::config::args::filter_config_args`]).
///
/// 1. Any argument and CLI feature enabled -> CLI mode
/// 2. Server feature enabled -> Server mode (default)
/// 3. Otherwise -> Unknown
pub fn detect_mode(args: &[String]) -> Mode {
    #[cfg(feature = "cli")]
    if args.len() > 1 {
        return Mode::Cli;
    }

    #[cfg(feature = "server")]
    return Mode::Server;

    #[cfg(not(feature = "server"))]
    Mode::Unknown
}
