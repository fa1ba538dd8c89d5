pub mod csv_handler;
pub mod password;
pub mod signature;
pub mod url_validator;

/// 生成随机字母数字串（用于缺省 JWT 密钥、集成 UUID 之外的令牌）
pub fn generate_secure_token(length: usize) -> String {
    use rand::RngExt;
    use std::iter;

    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    iter::repeat_with(|| CHARS[rng.random_range(0..CHARS.len())] as char)
        .take(length)
        .collect()
}

/// 标题转 slug：小写 ASCII 字母数字，其它字符折叠为单个连字符
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// 去掉首尾空白，空串视为 None
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
