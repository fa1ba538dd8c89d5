//! Webhook 签名校验（HMAC-SHA256，十六进制）

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// 计算 body 的十六进制 HMAC-SHA256
pub fn sign_hex(secret: &str, body: &[u8]) -> String {
    // HMAC 接受任意长度的密钥，new_from_slice 不会失败
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// 校验签名头，允许 `sha256=` 前缀，大小写不敏感
pub fn verify_hex_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let provided = header_value.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(provided_bytes) = hex::decode(provided.to_ascii_lowercase()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided_bytes).is_ok()
}

/// 常量时间比较两个字符串
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// body 的十六进制 SHA-256
pub fn sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
