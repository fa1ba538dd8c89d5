//! 客户网站等字段的 URL / 邮箱格式校验

use url::Url;

/// URL 校验错误
#[derive(Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    EmptyUrl,
    InvalidProtocol(String),
    InvalidFormat(String),
}

impl std::fmt::Display for UrlValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUrl => write!(f, "URL cannot be empty"),
            Self::InvalidProtocol(proto) => write!(
                f,
                "must be an http:// or https:// URL (got {})",
                proto
            ),
            Self::InvalidFormat(msg) => write!(f, "is not a valid URL: {}", msg),
        }
    }
}

impl std::error::Error for UrlValidationError {}

/// 只接受带主机名的 http/https URL
pub fn validate_http_url(url: &str) -> Result<(), UrlValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(UrlValidationError::EmptyUrl);
    }

    let parsed = Url::parse(url).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::InvalidProtocol(format!("{}:", other))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::InvalidFormat("missing host".to_string()));
    }
    Ok(())
}

/// 粗粒度邮箱校验：local@domain.tld
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_http_url("https://acme.example").is_ok());
        assert!(validate_http_url("http://acme.example:8080/about").is_ok());
    }

    #[test]
    fn test_invalid_urls() {
        assert_eq!(validate_http_url("  "), Err(UrlValidationError::EmptyUrl));
        assert!(matches!(
            validate_http_url("ftp://files.example"),
            Err(UrlValidationError::InvalidProtocol(_))
        ));
        assert!(matches!(
            validate_http_url("javascript:alert(1)"),
            Err(UrlValidationError::InvalidProtocol(_))
        ));
        assert!(matches!(
            validate_http_url("acme.example"),
            Err(UrlValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_email() {
        assert!(is_plausible_email("ops@acme.example"));
        assert!(!is_plausible_email("ops@acme"));
        assert!(!is_plausible_email("@acme.example"));
        assert!(!is_plausible_email("o ps@acme.example"));
        assert!(!is_plausible_email("a@b@c.example"));
    }
}
