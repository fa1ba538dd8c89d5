//! Logging system initialization
//!
//! Builds the global tracing subscriber from the `[logging]` section.

use std::io::Write;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::config::LoggingConfig;

/// Initialize logging system based on configuration
///
/// Must be called once, after the configuration has been loaded.
/// The returned `WorkerGuard` has to stay alive for the duration of the
/// program so buffered log lines get flushed.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let writer = build_writer(config);

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_target(true)
        .with_ansi(config.file.as_ref().is_none_or(|f| f.is_empty()));

    let result = if config.format == "json" {
        subscriber_builder.json().try_init()
    } else {
        subscriber_builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("[WARN] Logging already initialized: {}", e);
    }

    guard
}

fn build_writer(config: &LoggingConfig) -> Box<dyn Write + Send + Sync> {
    let Some(log_file) = config.file.as_ref().filter(|f| !f.is_empty()) else {
        return Box::new(std::io::stdout());
    };

    if config.enable_rotation {
        let path = Path::new(log_file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("nestogy.log")
            .trim_end_matches(".log")
            .to_string();

        match rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.max_backups.max(1) as usize)
            .build(dir)
        {
            Ok(appender) => return Box::new(appender),
            Err(e) => {
                eprintln!(
                    "[ERROR] Failed to create rolling log appender in {}: {}, falling back to stdout",
                    dir.display(),
                    e
                );
                return Box::new(std::io::stdout());
            }
        }
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
    {
        Ok(file) => Box::new(file),
        Err(e) => {
            eprintln!(
                "[ERROR] Failed to open log file {}: {}, falling back to stdout",
                log_file, e
            );
            Box::new(std::io::stdout())
        }
    }
}
