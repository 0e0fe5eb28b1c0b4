use std::env;

use super::types::{ConfigError, Environment};

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

/// Accepts an absolute http(s) URL and drops trailing slashes so handler
/// names can be appended directly.
pub(super) fn parse_base_url(value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim_end_matches('/');
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidBaseUrl(value));
    };
    if !matches!(scheme, "http" | "https") || rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::InvalidBaseUrl(value));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("production".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }

    #[test]
    fn parse_base_url_strips_trailing_slash() {
        let parsed = parse_base_url("https://lms.example.org/handler/".to_string()).expect("url");
        assert_eq!(parsed, "https://lms.example.org/handler");
    }

    #[test]
    fn parse_base_url_rejects_relative_and_other_schemes() {
        assert!(parse_base_url("/handler".to_string()).is_err());
        assert!(parse_base_url("ftp://host/handler".to_string()).is_err());
        assert!(parse_base_url("http://".to_string()).is_err());
    }

    #[test]
    fn parse_u64_reports_field() {
        let err = parse_u64("SGA_UPLOAD_CHUNK_KB", "lots".to_string()).expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidValue { field: "SGA_UPLOAD_CHUNK_KB", .. }));
    }
}
