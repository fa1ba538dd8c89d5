//! CSV 导入导出共享逻辑
//!
//! 客户、资产的导入导出以及薪资导出共用同一套读写配置。

use chrono::Utc;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::errors::{NestogyError, Result};

/// 导入时遇到已存在记录的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// 跳过已存在的记录
    #[default]
    Skip,
    /// 覆盖已存在的记录
    Overwrite,
    /// 已存在即记为失败
    Error,
}

impl std::str::FromStr for ImportMode {
    type Err = NestogyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "skip" => Ok(ImportMode::Skip),
            "overwrite" => Ok(ImportMode::Overwrite),
            "error" => Ok(ImportMode::Error),
            _ => Err(NestogyError::invalid_field(
                "mode",
                "must be one of: skip, overwrite, error",
            )),
        }
    }
}

/// 单行导入错误
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

/// 导入结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ImportRowError>,
}

impl ImportReport {
    pub fn fail(&mut self, row: usize, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(ImportRowError {
            row,
            message: message.into(),
        });
    }
}

/// 解析 CSV；每行返回 (行号, 解析结果)，行号从 2 开始（跳过表头）
pub fn read_rows<T: DeserializeOwned>(data: &[u8]) -> Vec<(usize, Result<T>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(idx, row)| (idx + 2, row.map_err(NestogyError::from)))
        .collect()
}

/// 序列化为带表头的 CSV 文本
pub fn write_rows<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| NestogyError::csv(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| NestogyError::csv(e.to_string()))
}

/// 生成默认导出文件名（带时间戳）
pub fn export_filename(prefix: &str) -> String {
    format!("{}_{}.csv", prefix, Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
        #[serde(default)]
        email: Option<String>,
    }

    #[test]
    fn test_read_rows_reports_line_numbers() {
        let data = b"name,email\n Acme , ops@acme.example\n\"Beta\"\n";
        let rows = read_rows::<Row>(data);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        let first = rows[0].1.as_ref().unwrap();
        assert_eq!(first.name, "Acme");
        assert_eq!(first.email.as_deref(), Some("ops@acme.example"));
        assert_eq!(rows[1].0, 3);
        assert_eq!(rows[1].1.as_ref().unwrap().email, None);
    }

    #[test]
    fn test_write_rows_has_header() {
        let csv = write_rows(&[Row {
            name: "Acme, Inc".into(),
            email: None,
        }])
        .unwrap();
        assert_eq!(csv, "name,email\n\"Acme, Inc\",\n");
    }

    #[test]
    fn test_import_mode_parse() {
        assert_eq!("".parse::<ImportMode>().unwrap(), ImportMode::Skip);
        assert_eq!("Overwrite".parse::<ImportMode>().unwrap(), ImportMode::Overwrite);
        assert!("merge".parse::<ImportMode>().is_err());
    }

    #[test]
    fn test_report_fail() {
        let mut report = ImportReport::default();
        report.fail(4, "bad row");
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0], ImportRowError { row: 4, message: "bad row".into() });
    }
}
