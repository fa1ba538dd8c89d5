//! Import and export clients / assets as CSV

use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::services::AppServices;
use crate::utils::csv_handler::{ImportMode, ImportReport, export_filename};

fn read_input(file_path: &str) -> Result<Vec<u8>, CliError> {
    std::fs::read(file_path).map_err(|e| {
        CliError::CommandError(format!("Failed to read import file '{}': {}", file_path, e))
    })
}

fn write_output(prefix: &str, file_path: Option<String>, csv: &str) -> Result<String, CliError> {
    let output_path = file_path.unwrap_or_else(|| export_filename(prefix));
    std::fs::write(&output_path, csv).map_err(|e| {
        CliError::CommandError(format!(
            "Failed to create export file '{}': {}",
            output_path, e
        ))
    })?;
    Ok(output_path)
}

fn print_report(kind: &str, report: &ImportReport) {
    println!(
        "{} Imported {} {} ({} skipped, {} failed)",
        "✓".bold().green(),
        report.success.to_string().green(),
        kind,
        report.skipped.to_string().yellow(),
        report.failed.to_string().red()
    );
    for err in &report.errors {
        println!("  {} row {}: {}", "✗".red(), err.row, err.message);
    }
}

pub async fn import_clients(
    services: &AppServices,
    company_id: i32,
    file_path: String,
    mode: &str,
) -> Result<(), CliError> {
    let mode: ImportMode = mode.parse()?;
    let ctx = services.auth.admin_context(company_id).await?;
    let data = read_input(&file_path)?;

    let report = services.clients.import_csv(&ctx, &data, mode).await?;
    print_report("clients", &report);
    Ok(())
}

pub async fn export_clients(
    services: &AppServices,
    company_id: i32,
    file_path: Option<String>,
) -> Result<(), CliError> {
    let ctx = services.auth.admin_context(company_id).await?;
    let csv = services.clients.export_csv(&ctx).await?;
    let rows = csv.lines().count().saturating_sub(1);
    let output_path = write_output("clients", file_path, &csv)?;

    println!(
        "{} Exported {} clients to: {}",
        "✓".bold().green(),
        rows.to_string().green(),
        output_path.cyan()
    );
    Ok(())
}

pub async fn import_assets(
    services: &AppServices,
    company_id: i32,
    file_path: String,
    mode: &str,
) -> Result<(), CliError> {
    let mode: ImportMode = mode.parse()?;
    let ctx = services.auth.admin_context(company_id).await?;
    let data = read_input(&file_path)?;

    // 事件同步分发，命令返回时合同自动关联已完成
    let report = services.assets.import_csv(&ctx, &data, mode).await?;
    print_report("assets", &report);
    Ok(())
}

pub async fn export_assets(
    services: &AppServices,
    company_id: i32,
    file_path: Option<String>,
) -> Result<(), CliError> {
    let ctx = services.auth.admin_context(company_id).await?;
    let csv = services.assets.export_csv(&ctx).await?;
    let rows = csv.lines().count().saturating_sub(1);
    let output_path = write_output("assets", file_path, &csv)?;

    println!(
        "{} Exported {} assets to: {}",
        "✓".bold().green(),
        rows.to_string().green(),
        output_path.cyan()
    );
    Ok(())
}
