//! RMM 负载字段识别
//!
//! 每个字段有一组候选键，先查顶层，再依次查 `data`、`device`、`alert`、`payload`
//! 嵌套对象；第一个命中的候选键生效。集成上配置的点路径映射优先于自动识别。

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

use crate::errors::{NestogyError, Result};

/// 自动识别时依次查找的嵌套对象
const NESTED_SCOPES: [&str; 4] = ["data", "device", "alert", "payload"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumIter, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RmmField {
    EventId,
    DeviceId,
    Hostname,
    AlertType,
    Severity,
    Message,
    IpAddress,
    Os,
    SerialNumber,
}

impl RmmField {
    fn candidates(self) -> &'static [&'static str] {
        match self {
            RmmField::EventId => &["event_id", "eventId", "alert_id", "alertId", "alertUid", "uid", "id"],
            RmmField::DeviceId => &[
                "device_id", "deviceId", "deviceUid", "agent_id", "agentId", "node_id", "nodeId",
                "computer_id",
            ],
            RmmField::Hostname => &[
                "hostname", "host_name", "host", "computer_name", "computerName", "device_name",
                "deviceName", "system_name", "systemName", "machine_name",
            ],
            RmmField::AlertType => &[
                "alert_type", "alertType", "event_type", "eventType", "type", "category", "condition",
            ],
            RmmField::Severity => &["severity", "alert_severity", "priority", "level"],
            RmmField::Message => &[
                "message", "alert_message", "description", "summary", "details", "text",
            ],
            RmmField::IpAddress => &[
                "ip_address", "ipAddress", "ip", "internal_ip", "lan_ip", "private_ip", "public_ip",
            ],
            RmmField::Os => &[
                "os", "os_name", "osName", "operating_system", "operatingSystem", "platform",
            ],
            RmmField::SerialNumber => &["serial_number", "serialNumber", "serial", "bios_serial"],
        }
    }
}

/// 识别结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectedFields {
    pub event_id: Option<String>,
    pub device_id: Option<String>,
    pub hostname: Option<String>,
    pub alert_type: Option<String>,
    pub severity: Option<String>,
    pub message: Option<String>,
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub serial_number: Option<String>,
}

impl DetectedFields {
    fn slot(&mut self, field: RmmField) -> &mut Option<String> {
        match field {
            RmmField::EventId => &mut self.event_id,
            RmmField::DeviceId => &mut self.device_id,
            RmmField::Hostname => &mut self.hostname,
            RmmField::AlertType => &mut self.alert_type,
            RmmField::Severity => &mut self.severity,
            RmmField::Message => &mut self.message,
            RmmField::IpAddress => &mut self.ip_address,
            RmmField::Os => &mut self.os,
            RmmField::SerialNumber => &mut self.serial_number,
        }
    }

    /// 负载里是否带有告警信息
    pub fn has_alert(&self) -> bool {
        self.alert_type.is_some() || self.message.is_some() || self.severity.is_some()
    }
}

/// 字段 → 点路径
pub type FieldMappings = BTreeMap<RmmField, String>;

/// 解析并校验集成上保存的映射 JSON
pub fn parse_mappings(raw: &Value) -> Result<FieldMappings> {
    let obj = raw
        .as_object()
        .ok_or_else(|| NestogyError::invalid_field("field_mappings", "must be a JSON object"))?;

    let mut mappings = FieldMappings::new();
    for (key, path) in obj {
        let field = key.parse::<RmmField>().map_err(|_| {
            let allowed: Vec<String> = RmmField::iter().map(|f| f.as_ref().to_string()).collect();
            NestogyError::invalid_field(
                "field_mappings",
                format!("unknown field '{}', expected one of: {}", key, allowed.join(", ")),
            )
        })?;
        let path = path
            .as_str()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                NestogyError::invalid_field(
                    "field_mappings",
                    format!("path for '{}' must be a non-empty string", key),
                )
            })?;
        mappings.insert(field, path.to_string());
    }
    Ok(mappings)
}

/// 读取存储的映射；损坏的数据按无映射处理
pub fn stored_mappings(raw: Option<&str>) -> FieldMappings {
    raw.and_then(|s| serde_json::from_str::<Value>(s).ok())
        .and_then(|v| parse_mappings(&v).ok())
        .unwrap_or_default()
}

/// 标量转字符串；空串、对象和数组不算命中
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 按点路径取值，例如 `device.system.hostname`
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(root, |node, seg| match node {
            Value::Object(map) => map.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn first_candidate(scope: &Map<String, Value>, field: RmmField) -> Option<String> {
    field
        .candidates()
        .iter()
        .find_map(|key| scope.get(*key).and_then(scalar))
}

fn auto_detect(root: &Map<String, Value>, field: RmmField) -> Option<String> {
    first_candidate(root, field).or_else(|| {
        NESTED_SCOPES.iter().find_map(|name| {
            root.get(*name)
                .and_then(Value::as_object)
                .and_then(|nested| first_candidate(nested, field))
        })
    })
}

/// 从负载中识别所有字段
pub fn detect_fields(payload: &Map<String, Value>, mappings: &FieldMappings) -> DetectedFields {
    let root = Value::Object(payload.clone());
    let mut detected = DetectedFields::default();
    for field in RmmField::iter() {
        let mapped = mappings
            .get(&field)
            .and_then(|path| lookup_path(&root, path))
            .and_then(scalar);
        *detected.slot(field) = mapped.or_else(|| auto_detect(payload, field));
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_top_level_wins_over_nested() {
        let payload = obj(json!({
            "hostname": "top-host",
            "data": { "hostname": "nested-host", "deviceId": 42 }
        }));
        let fields = detect_fields(&payload, &FieldMappings::new());
        assert_eq!(fields.hostname.as_deref(), Some("top-host"));
        assert_eq!(fields.device_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_candidate_order_within_scope() {
        let payload = obj(json!({ "alertId": "a-1", "id": "x-9", "event_id": "" }));
        let fields = detect_fields(&payload, &FieldMappings::new());
        // 空串不算命中，按候选顺序下一个是 alertId
        assert_eq!(fields.event_id.as_deref(), Some("a-1"));
    }

    #[test]
    fn test_nested_scopes_in_order() {
        let payload = obj(json!({
            "device": { "computerName": "WS-01", "osName": "Windows 11" },
            "alert": { "severity": "Critical", "message": "Disk full", "type": "disk" }
        }));
        let fields = detect_fields(&payload, &FieldMappings::new());
        assert_eq!(fields.hostname.as_deref(), Some("WS-01"));
        assert_eq!(fields.os.as_deref(), Some("Windows 11"));
        assert_eq!(fields.severity.as_deref(), Some("Critical"));
        assert_eq!(fields.alert_type.as_deref(), Some("disk"));
        assert!(fields.has_alert());
    }

    #[test]
    fn test_mapping_overrides_detection() {
        let payload = obj(json!({
            "hostname": "detected",
            "meta": { "machine": { "label": "mapped-host" } },
            "checks": [{ "sev": 5 }]
        }));
        let mappings = parse_mappings(&json!({
            "hostname": "meta.machine.label",
            "severity": "checks.0.sev",
            "os": "missing.path"
        }))
        .unwrap();
        let fields = detect_fields(&payload, &mappings);
        assert_eq!(fields.hostname.as_deref(), Some("mapped-host"));
        assert_eq!(fields.severity.as_deref(), Some("5"));
        assert_eq!(fields.os, None);
    }

    #[test]
    fn test_parse_mappings_rejects_unknown_fields() {
        let err = parse_mappings(&json!({ "colour": "a.b" })).unwrap_err();
        assert!(err.field_errors().unwrap()["field_mappings"][0].contains("unknown field"));
        assert!(parse_mappings(&json!({ "hostname": "" })).is_err());
        assert!(parse_mappings(&json!(["hostname"])).is_err());
    }

    #[test]
    fn test_stored_mappings_tolerates_garbage() {
        assert!(stored_mappings(Some("not json")).is_empty());
        assert!(stored_mappings(None).is_empty());
        assert_eq!(
            stored_mappings(Some(r#"{"device_id":"agent.uid"}"#)).get(&RmmField::DeviceId),
            Some(&"agent.uid".to_string())
        );
    }
}
