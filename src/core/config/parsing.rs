use std::env;
use std::str::FromStr;

use super::types::{ConfigError, Environment};

/// Vite and CRA dev servers plus the API's own port.
const DEV_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://localhost:8000"];

/// Extensions the upload wizard knows how to preview and validate.
const SUPPORTED_DOCUMENT_EXTENSIONS: &[&str] =
    &["pdf", "jpg", "jpeg", "png", "webp", "txt", "docx"];

/// Trimmed value of `key`; blank counts as unset.
pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

/// Parses `key` as a number, falling back to `default` when unset.
pub(super) fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { field: key, value }),
    }
}

/// Like [`env_number`], rejecting NaN and infinities.
pub(super) fn env_finite_f32(key: &'static str, default: f32) -> Result<f32, ConfigError> {
    let parsed = env_number(key, default)?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(ConfigError::InvalidValue { field: key, value: parsed.to_string() })
    }
}

/// Unset or unrecognized values read as `false`.
pub(super) fn env_flag(key: &str) -> bool {
    env_optional(key).is_some_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Accepts a JSON array or a comma-separated list. Empty input falls back to
/// the local development origins.
pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let raw = value.unwrap_or_default();
    let raw = raw.trim();

    let origins: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|_| ConfigError::InvalidCors(raw.to_string()))?
    } else {
        split_list(raw, false)
    };

    if origins.is_empty() {
        Ok(DEV_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect())
    } else {
        Ok(origins)
    }
}

/// Lower-cased comma-separated list from `key`, or `defaults` when unset.
pub(super) fn env_list(key: &str, defaults: &[&str]) -> Vec<String> {
    match env_optional(key) {
        Some(raw) => split_list(&raw, true),
        None => defaults.iter().map(|item| item.to_string()).collect(),
    }
}

fn split_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| if lowercase { item.to_ascii_lowercase() } else { item.to_string() })
        .collect()
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.unwrap_or_default().to_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "staging" => Environment::Staging,
        "test" | "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn is_supported_document_extension(extension: &str) -> bool {
    SUPPORTED_DOCUMENT_EXTENSIONS.contains(&extension)
}
