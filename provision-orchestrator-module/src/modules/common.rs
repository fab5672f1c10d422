//! Module 公共工具函数

use crate::error::{ModuleError, Result};
use crate::types::ModuleConfig;

/// Reads a configuration value the registry has already validated as required.
pub fn require_config<'a>(config: &'a ModuleConfig, provider: &str, key: &str) -> Result<&'a str> {
    config.get(key).ok_or_else(|| ModuleError::InvalidParameter {
        provider: provider.to_string(),
        param: key.to_string(),
        detail: "missing configuration value".to_string(),
    })
}

/// Reads a required request field.
pub fn require_field<'a>(value: Option<&'a str>, provider: &str, param: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ModuleError::InvalidParameter {
            provider: provider.to_string(),
            param: param.to_string(),
            detail: "is required".to_string(),
        })
}

/// Resource limit as sent to control panels: `None` means unlimited.
///
/// Empty and `unlimited` (any case) are unlimited; anything unparseable is too.
pub fn parse_limit(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unlimited") {
        return None;
    }
    raw.parse().ok()
}

/// Lower-cased message contains any of the needles.
pub fn message_matches(message: &str, needles: &[&str]) -> bool {
    let lower = message.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}
