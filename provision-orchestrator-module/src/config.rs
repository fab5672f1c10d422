//! Configuration resolution against a module's declared fields.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::types::{ConfigField, FieldType, ModuleConfig, ModuleMetadata, ValueRule};

/// A configuration value that does not satisfy its field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFieldError {
    pub field: String,
    pub reason: String,
}

impl ConfigFieldError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}': {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigFieldError {}

/// Merges configuration layers over the module defaults and validates the result.
///
/// `layers` are applied in order, later layers win (module defaults, then product
/// overrides, then server overrides); a blank value inherits from the layer below.
/// Keys the module does not declare are dropped.
/// Booleans are normalised to `"true"`/`"false"` and password fields are marked secret.
pub fn resolve_config(
    metadata: &ModuleMetadata,
    layers: &[&BTreeMap<String, String>],
) -> Result<ModuleConfig, ConfigFieldError> {
    let mut merged: BTreeMap<&str, &str> = BTreeMap::new();
    for field in &metadata.config_fields {
        if let Some(default) = field.default.as_deref() {
            merged.insert(field.name.as_str(), default);
        }
    }
    for layer in layers {
        for (key, value) in *layer {
            if metadata.field(key).is_none() {
                log::warn!(
                    "[{}] Ignoring undeclared configuration key '{key}'",
                    metadata.id
                );
                continue;
            }
            if !value.trim().is_empty() {
                merged.insert(key.as_str(), value.as_str());
            }
        }
    }

    let mut config = ModuleConfig::new();
    for field in &metadata.config_fields {
        let raw = merged.get(field.name.as_str()).map(|v| v.trim()).unwrap_or("");
        if raw.is_empty() {
            if field.required {
                return Err(ConfigFieldError::new(&field.name, "is required"));
            }
            continue;
        }
        let value = validate_value(field, raw)?;
        config.insert(&field.name, value);
        if field.is_secret() {
            config.mark_secret(&field.name);
        }
    }
    Ok(config)
}

fn validate_value(field: &ConfigField, raw: &str) -> Result<String, ConfigFieldError> {
    match field.field_type {
        FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok("true".to_string()),
            "false" | "no" | "off" | "0" => Ok("false".to_string()),
            _ => Err(ConfigFieldError::new(
                &field.name,
                format!("'{raw}' is not a boolean"),
            )),
        },
        FieldType::Enum => {
            if field.options.iter().any(|o| o == raw) {
                Ok(raw.to_string())
            } else {
                Err(ConfigFieldError::new(
                    &field.name,
                    format!("'{raw}' is not one of [{}]", field.options.join(", ")),
                ))
            }
        }
        FieldType::Text | FieldType::Password => {
            if let Some(rule) = field.rule {
                check_rule(&field.name, rule, raw)?;
            }
            Ok(raw.to_string())
        }
    }
}

fn check_rule(name: &str, rule: ValueRule, raw: &str) -> Result<(), ConfigFieldError> {
    let ok = match rule {
        ValueRule::Port => raw.parse::<u16>().is_ok_and(|p| p > 0),
        ValueRule::Ipv4 => raw.parse::<Ipv4Addr>().is_ok(),
        ValueRule::Limit => raw.eq_ignore_ascii_case("unlimited") || raw.parse::<u64>().is_ok(),
        ValueRule::Hostname => {
            !raw.contains("://")
                && !raw.contains('/')
                && !raw.contains(char::is_whitespace)
                && raw
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
        }
    };
    if ok {
        Ok(())
    } else {
        Err(ConfigFieldError::new(
            name,
            format!("'{raw}' does not satisfy rule {rule:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModuleType, Operation};

    fn metadata() -> ModuleMetadata {
        ModuleMetadata {
            id: "test".to_string(),
            display_name: "Test".to_string(),
            api_version: "1.1".to_string(),
            module_type: ModuleType::Server,
            capabilities: vec![Operation::TestConnection],
            default_non_ssl_port: None,
            default_ssl_port: None,
            sso_label: None,
            admin_sso_label: None,
            config_fields: vec![
                ConfigField::text("hostname", "Hostname")
                    .required()
                    .with_rule(ValueRule::Hostname),
                ConfigField::text("port", "Port")
                    .with_default("2222")
                    .with_rule(ValueRule::Port),
                ConfigField::password("password", "Password").required(),
                ConfigField::boolean("secure", "Use SSL", true),
                ConfigField::enumeration("level", "Account Level", &["user", "reseller"]),
            ],
        }
    }

    fn layer(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn later_layers_override_defaults() {
        let product = layer(&[("hostname", "da.example.com"), ("password", "x")]);
        let server = layer(&[("port", "2223"), ("secure", "off")]);
        let config = resolve_config(&metadata(), &[&product, &server]).unwrap();
        assert_eq!(config.get("port"), Some("2223"));
        assert_eq!(config.get("secure"), Some("false"));
        assert_eq!(config.get("level"), Some("user"));
        assert_eq!(config.secret_values(), vec!["x".to_string()]);
    }

    #[test]
    fn missing_required_field_fails() {
        let product = layer(&[("hostname", "da.example.com")]);
        let err = resolve_config(&metadata(), &[&product]).unwrap_err();
        assert_eq!(err.field, "password");
    }

    #[test]
    fn bad_enum_and_port_fail() {
        let base = layer(&[("hostname", "h"), ("password", "p")]);
        let bad_enum = layer(&[("level", "admin")]);
        assert_eq!(
            resolve_config(&metadata(), &[&base, &bad_enum])
                .unwrap_err()
                .field,
            "level"
        );
        let bad_port = layer(&[("port", "99999")]);
        assert_eq!(
            resolve_config(&metadata(), &[&base, &bad_port])
                .unwrap_err()
                .field,
            "port"
        );
    }

    #[test]
    fn hostname_rule_rejects_urls() {
        let base = layer(&[("hostname", "https://da.example.com"), ("password", "p")]);
        assert_eq!(
            resolve_config(&metadata(), &[&base]).unwrap_err().field,
            "hostname"
        );
    }

    #[test]
    fn undeclared_keys_are_dropped() {
        let base = layer(&[("hostname", "h"), ("password", "p"), ("colour", "blue")]);
        let config = resolve_config(&metadata(), &[&base]).unwrap();
        assert_eq!(config.get("colour"), None);
    }
}
