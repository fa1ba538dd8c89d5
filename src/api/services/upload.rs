//! CSV 上传与下载的共用部分

use actix_multipart::Multipart;
use actix_web::HttpResponse;
use futures_util::stream::StreamExt;
use tracing::{error, info};

use crate::errors::{NestogyError, Result};
use crate::utils::csv_handler::{ImportMode, export_filename};

/// 最大导入文件大小 (10MB)
const MAX_IMPORT_FILE_SIZE: usize = 10 * 1024 * 1024;

/// 导入表单：`file` 为 CSV，`mode` 为 skip|overwrite|error（缺省 skip）
pub struct ImportForm {
    pub data: Vec<u8>,
    pub mode: ImportMode,
}

/// 解析 multipart 导入表单
pub async fn read_import_form(mut payload: Multipart) -> Result<ImportForm> {
    let mut csv_data: Option<Vec<u8>> = None;
    let mut mode_raw = String::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            error!("Failed to parse multipart field: {}", e);
            NestogyError::validation(format!("Invalid multipart data: {}", e))
        })?;

        let field_name = field.name().unwrap_or("").to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let bytes = chunk.map_err(|e| {
                NestogyError::validation(format!("Failed to read field '{}': {}", field_name, e))
            })?;
            if data.len() + bytes.len() > MAX_IMPORT_FILE_SIZE {
                return Err(NestogyError::invalid_field(
                    &field_name,
                    format!(
                        "may not be greater than {} MB",
                        MAX_IMPORT_FILE_SIZE / 1024 / 1024
                    ),
                ));
            }
            data.extend_from_slice(&bytes);
        }

        match field_name.as_str() {
            "file" => csv_data = Some(data),
            "mode" => mode_raw = String::from_utf8_lossy(&data).to_string(),
            // 忽略未知字段
            _ => {}
        }
    }

    let data = csv_data.ok_or_else(|| NestogyError::invalid_field("file", "is required"))?;
    let mode = mode_raw.parse::<ImportMode>()?;
    info!("API: received import file ({} bytes, mode {:?})", data.len(), mode);
    Ok(ImportForm { data, mode })
}

/// CSV 附件响应
pub fn csv_attachment(prefix: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", export_filename(prefix)),
        ))
        .body(body)
}
