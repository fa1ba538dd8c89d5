//! migrate / expire-contracts

use chrono::{NaiveDate, Utc};
use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::services::AppServices;

/// 迁移在建立存储时已经执行，这里只做确认输出
pub async fn run_migrations(services: &AppServices) -> Result<(), CliError> {
    services.storage.ping().await?;
    println!(
        "{} Database migrations are up to date ({})",
        "✓".bold().green(),
        services.storage.backend_name().cyan()
    );
    Ok(())
}

fn parse_date(date: Option<String>) -> Result<NaiveDate, CliError> {
    match date {
        None => Ok(Utc::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
            CliError::ParseError(format!("Invalid date '{}' (expected YYYY-MM-DD): {}", raw, e))
        }),
    }
}

pub async fn expire_contracts(services: &AppServices, date: Option<String>) -> Result<(), CliError> {
    let today = parse_date(date)?;
    let expired = services.contracts.expire_ended(today).await?;

    if expired.is_empty() {
        println!("{} No contracts ended before {}", "ℹ".bold().blue(), today);
        return Ok(());
    }
    println!(
        "{} Expired {} contracts ended before {}",
        "✓".bold().green(),
        expired.len().to_string().green(),
        today
    );
    for c in &expired {
        println!("  - [{}] {} (company {})", c.id, c.name.cyan(), c.company_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2026-03-31".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
        );
        assert!(matches!(
            parse_date(Some("31/03/2026".to_string())),
            Err(CliError::ParseError(_))
        ));
        assert_eq!(parse_date(None).unwrap(), Utc::now().date_naive());
    }
}
