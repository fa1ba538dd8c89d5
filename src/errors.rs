use std::collections::BTreeMap;
use std::fmt;

use actix_web::http::StatusCode;

/// 字段级校验错误：字段名 → 错误信息列表
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub enum NestogyError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    InvalidFields(FieldErrors),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Serialization(String),
    DateParse(String),
    Csv(String),
    QueueFull(String),
    Integration(String),
    Misconfigured(String),
    Internal(String),
}

impl NestogyError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            NestogyError::DatabaseConfig(_) => "E001",
            NestogyError::DatabaseConnection(_) => "E002",
            NestogyError::DatabaseOperation(_) => "E003",
            NestogyError::FileOperation(_) => "E004",
            NestogyError::Validation(_) => "E005",
            NestogyError::InvalidFields(_) => "E006",
            NestogyError::NotFound(_) => "E007",
            NestogyError::Unauthorized(_) => "E008",
            NestogyError::Forbidden(_) => "E009",
            NestogyError::Serialization(_) => "E010",
            NestogyError::DateParse(_) => "E011",
            NestogyError::Csv(_) => "E012",
            NestogyError::QueueFull(_) => "E013",
            NestogyError::Integration(_) => "E014",
            NestogyError::Misconfigured(_) => "E015",
            NestogyError::Internal(_) => "E016",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            NestogyError::DatabaseConfig(_) => "Database Configuration Error",
            NestogyError::DatabaseConnection(_) => "Database Connection Error",
            NestogyError::DatabaseOperation(_) => "Database Operation Error",
            NestogyError::FileOperation(_) => "File Operation Error",
            NestogyError::Validation(_) => "Validation Error",
            NestogyError::InvalidFields(_) => "Validation Error",
            NestogyError::NotFound(_) => "Resource Not Found",
            NestogyError::Unauthorized(_) => "Unauthorized",
            NestogyError::Forbidden(_) => "Forbidden",
            NestogyError::Serialization(_) => "Serialization Error",
            NestogyError::DateParse(_) => "Date Parse Error",
            NestogyError::Csv(_) => "CSV Error",
            NestogyError::QueueFull(_) => "Queue Full",
            NestogyError::Integration(_) => "Integration Error",
            NestogyError::Misconfigured(_) => "Misconfiguration",
            NestogyError::Internal(_) => "Internal Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            NestogyError::InvalidFields(_) => "The given data was invalid.",
            NestogyError::DatabaseConfig(msg)
            | NestogyError::DatabaseConnection(msg)
            | NestogyError::DatabaseOperation(msg)
            | NestogyError::FileOperation(msg)
            | NestogyError::Validation(msg)
            | NestogyError::NotFound(msg)
            | NestogyError::Unauthorized(msg)
            | NestogyError::Forbidden(msg)
            | NestogyError::Serialization(msg)
            | NestogyError::DateParse(msg)
            | NestogyError::Csv(msg)
            | NestogyError::QueueFull(msg)
            | NestogyError::Integration(msg)
            | NestogyError::Misconfigured(msg)
            | NestogyError::Internal(msg) => msg,
        }
    }

    /// 字段级错误（仅 InvalidFields 携带）
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            NestogyError::InvalidFields(errors) => Some(errors),
            _ => None,
        }
    }

    /// 映射到 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            NestogyError::Validation(_)
            | NestogyError::InvalidFields(_)
            | NestogyError::DateParse(_)
            | NestogyError::Csv(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NestogyError::NotFound(_) => StatusCode::NOT_FOUND,
            NestogyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            NestogyError::Forbidden(_) => StatusCode::FORBIDDEN,
            NestogyError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            NestogyError::DatabaseConfig(_)
            | NestogyError::DatabaseConnection(_)
            | NestogyError::DatabaseOperation(_)
            | NestogyError::FileOperation(_)
            | NestogyError::Serialization(_)
            | NestogyError::Integration(_)
            | NestogyError::Misconfigured(_)
            | NestogyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于 CLI 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        let mut out = format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        );
        if let Some(errors) = self.field_errors() {
            for (field, messages) in errors {
                out.push_str(&format!("\n  {}: {}", field.cyan(), messages.join(", ")));
            }
        }
        out
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        match self.field_errors() {
            Some(errors) => {
                let details: Vec<String> = errors
                    .iter()
                    .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
                    .collect();
                format!("{}: {}", self.error_type(), details.join("; "))
            }
            None => format!("{}: {}", self.error_type(), self.message()),
        }
    }
}

impl fmt::Display for NestogyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for NestogyError {}

// 便捷的构造函数
impl NestogyError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        NestogyError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        NestogyError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        NestogyError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        NestogyError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        NestogyError::Validation(msg.into())
    }

    /// 单字段校验错误
    pub fn invalid_field<F: Into<String>, M: Into<String>>(field: F, msg: M) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![msg.into()]);
        NestogyError::InvalidFields(errors)
    }

    pub fn invalid_fields(errors: FieldErrors) -> Self {
        NestogyError::InvalidFields(errors)
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        NestogyError::NotFound(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        NestogyError::Unauthorized(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        NestogyError::Forbidden(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        NestogyError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        NestogyError::DateParse(msg.into())
    }

    pub fn csv<T: Into<String>>(msg: T) -> Self {
        NestogyError::Csv(msg.into())
    }

    pub fn queue_full<T: Into<String>>(msg: T) -> Self {
        NestogyError::QueueFull(msg.into())
    }

    pub fn integration<T: Into<String>>(msg: T) -> Self {
        NestogyError::Integration(msg.into())
    }

    pub fn misconfigured<T: Into<String>>(msg: T) -> Self {
        NestogyError::Misconfigured(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        NestogyError::Internal(msg.into())
    }
}

/// 累积多个字段错误，最后一次性返回
#[derive(Debug, Default)]
pub struct FieldErrorsBuilder {
    errors: FieldErrors,
}

impl FieldErrorsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: Into<String>, M: Into<String>>(&mut self, field: F, msg: M) {
        self.errors.entry(field.into()).or_default().push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// 收集字段校验结果：失败时记下错误并返回 None
    pub fn capture<T>(&mut self, field: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(NestogyError::InvalidFields(fields)) => {
                for (name, messages) in fields {
                    self.errors.entry(name).or_default().extend(messages);
                }
                None
            }
            Err(other) => {
                self.add(field, other.message());
                None
            }
        }
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(NestogyError::InvalidFields(self.errors))
        }
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for NestogyError {
    fn from(err: sea_orm::DbErr) -> Self {
        NestogyError::DatabaseOperation(err.to_string())
    }
}

impl From<sea_orm::TransactionError<NestogyError>> for NestogyError {
    fn from(err: sea_orm::TransactionError<NestogyError>) -> Self {
        match err {
            sea_orm::TransactionError::Connection(e) => e.into(),
            sea_orm::TransactionError::Transaction(e) => e,
        }
    }
}

impl From<std::io::Error> for NestogyError {
    fn from(err: std::io::Error) -> Self {
        NestogyError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for NestogyError {
    fn from(err: serde_json::Error) -> Self {
        NestogyError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for NestogyError {
    fn from(err: csv::Error) -> Self {
        NestogyError::Csv(err.to_string())
    }
}

impl From<chrono::ParseError> for NestogyError {
    fn from(err: chrono::ParseError) -> Self {
        NestogyError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NestogyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            NestogyError::validation("bad").http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            NestogyError::not_found("x").http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NestogyError::forbidden("x").http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            NestogyError::queue_full("x").http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            NestogyError::misconfigured("x").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_field_carries_field_errors() {
        let err = NestogyError::invalid_field("name", "has already been taken");
        let errors = err.field_errors().unwrap();
        assert_eq!(errors["name"], vec!["has already been taken".to_string()]);
        assert_eq!(err.message(), "The given data was invalid.");
        assert!(err.format_simple().contains("name: has already been taken"));
    }

    #[test]
    fn test_field_errors_builder() {
        let mut builder = FieldErrorsBuilder::new();
        assert!(builder.is_empty());
        builder.add("email", "is invalid");
        builder.add("email", "is too long");
        let err = builder.finish().unwrap_err();
        assert_eq!(err.field_errors().unwrap()["email"].len(), 2);
        assert!(FieldErrorsBuilder::new().finish().is_ok());
    }

    #[test]
    fn test_from_db_err() {
        let err: NestogyError = sea_orm::DbErr::Custom("boom".into()).into();
        assert_eq!(err.code(), "E003");
    }
}
