//! create-company 命令

use std::io::{self, BufRead, IsTerminal, Write};

use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::services::AppServices;
use crate::services::tenancy::CreateCompanyRequest;

/// 最短密码长度
const MIN_PASSWORD_LEN: usize = 8;

/// 从不同来源获取密码
fn get_password(password: Option<String>, stdin: bool) -> Result<String, CliError> {
    let password = if stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| CliError::CommandError(format!("Failed to read from stdin: {}", e)))?;
        line.trim().to_string()
    } else if let Some(pwd) = password {
        pwd
    } else {
        prompt_password_with_confirm()?
    };

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CliError::ParseError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(password)
}

/// 交互式输入密码（带确认）
fn prompt_password_with_confirm() -> Result<String, CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::CommandError(
            "No password provided. Use --password or --stdin flag, or run interactively."
                .to_string(),
        ));
    }

    let read = |prompt: &str| -> Result<String, CliError> {
        print!("{}", prompt);
        io::stdout()
            .flush()
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        rpassword::read_password()
            .map_err(|e| CliError::CommandError(format!("Failed to read password: {}", e)))
    };

    let password = read("Admin password: ")?;
    let confirm = read("Confirm password: ")?;
    if password != confirm {
        return Err(CliError::ParseError("Passwords do not match".to_string()));
    }
    Ok(password)
}

pub async fn create_company(
    services: &AppServices,
    name: String,
    currency: String,
    admin_name: String,
    admin_email: String,
    password: Option<String>,
    stdin: bool,
) -> Result<(), CliError> {
    let admin_password = get_password(password, stdin)?;

    let (company, admin) = services
        .auth
        .create_company(CreateCompanyRequest {
            name,
            currency,
            admin_name,
            admin_email,
            admin_password,
        })
        .await?;

    println!(
        "{} Created company {} (id {})",
        "✓".bold().green(),
        company.name.cyan(),
        company.id.to_string().green()
    );
    println!(
        "  {} {} <{}>",
        "Admin:".bold(),
        admin.name,
        admin.email.cyan()
    );
    Ok(())
}
