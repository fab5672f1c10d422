//! WHMCS-convention shapes.
//!
//! Third-party server and registrar modules describe themselves with a `MetaData`
//! array, a `ConfigOptions`/`getConfigArray` array and a set of `{module}_{Function}`
//! entry points, and answer with `"success"`, `{"success": true}` or `{"error": "..."}`.
//! This module converts between those shapes and [`ModuleMetadata`].

use serde_json::{Map, Value, json};

use crate::error::{ModuleError, Result};
use crate::types::{ConfigField, FieldType, ModuleMetadata, ModuleType, Operation};

fn whmcs_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "text",
        FieldType::Password => "password",
        FieldType::Boolean => "yesno",
        FieldType::Enum => "dropdown",
    }
}

/// Renders the `MetaData` array.
pub fn metadata_array(metadata: &ModuleMetadata) -> Value {
    let mut out = Map::new();
    out.insert("DisplayName".into(), json!(metadata.display_name));
    out.insert("APIVersion".into(), json!(metadata.api_version));
    out.insert(
        "RequiresServer".into(),
        json!(metadata.module_type == ModuleType::Server),
    );
    if let Some(port) = metadata.default_non_ssl_port {
        out.insert("DefaultNonSSLPort".into(), json!(port.to_string()));
    }
    if let Some(port) = metadata.default_ssl_port {
        out.insert("DefaultSSLPort".into(), json!(port.to_string()));
    }
    if let Some(label) = &metadata.sso_label {
        out.insert("ServiceSingleSignOnLabel".into(), json!(label));
    }
    if let Some(label) = &metadata.admin_sso_label {
        out.insert("AdminSingleSignOnLabel".into(), json!(label));
    }
    Value::Object(out)
}

/// Renders the `ConfigOptions` array, keyed by field name.
pub fn config_array(metadata: &ModuleMetadata) -> Value {
    let mut out = Map::new();
    for field in &metadata.config_fields {
        let mut entry = Map::new();
        entry.insert("FriendlyName".into(), json!(field.friendly_name));
        entry.insert("Type".into(), json!(whmcs_type(field.field_type)));
        if !field.options.is_empty() {
            entry.insert("Options".into(), json!(field.options.join(",")));
        }
        if let Some(default) = &field.default {
            let default = match field.field_type {
                FieldType::Boolean if default == "true" => "on",
                FieldType::Boolean => "",
                _ => default.as_str(),
            };
            entry.insert("Default".into(), json!(default));
        }
        if let Some(description) = &field.description {
            entry.insert("Description".into(), json!(description));
        }
        out.insert(field.name.clone(), Value::Object(entry));
    }
    Value::Object(out)
}

/// Function names a module of `module_type` exposes for its declared capabilities.
pub fn function_names(metadata: &ModuleMetadata) -> Vec<String> {
    metadata
        .capabilities
        .iter()
        .map(|op| {
            format!(
                "{}_{}",
                metadata.id,
                op.whmcs_function(metadata.module_type)
            )
        })
        .collect()
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn parse_port(obj: &Map<String, Value>, key: &str) -> Option<u16> {
    match obj.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    }
}

/// Builds [`ModuleMetadata`] for a module written against the WHMCS convention.
///
/// `functions` are the entry points the module defines, with or without the
/// `{module_id}_` prefix. Capabilities are derived from them, so an entry point the
/// module does not define can never be dispatched.
pub fn metadata_from_arrays(
    module_id: &str,
    module_type: ModuleType,
    meta: &Value,
    config: &Value,
    functions: &[&str],
) -> Result<ModuleMetadata> {
    let invalid = |detail: &str| ModuleError::InvalidParameter {
        provider: module_id.to_string(),
        param: "MetaData".to_string(),
        detail: detail.to_string(),
    };
    let meta = meta.as_object().ok_or_else(|| invalid("must be an object"))?;
    let config = config
        .as_object()
        .ok_or_else(|| invalid("ConfigOptions must be an object"))?;

    let prefix = format!("{module_id}_");
    let declared: Vec<&str> = functions
        .iter()
        .map(|f| f.strip_prefix(prefix.as_str()).unwrap_or(*f))
        .collect();
    let mut capabilities: Vec<Operation> = Operation::ALL
        .into_iter()
        .filter(|op| declared.contains(&op.whmcs_function(module_type)))
        .collect();
    // AdminSingleSignOn 也算作 SSO 能力
    if declared.contains(&"AdminSingleSignOn") && !capabilities.contains(&Operation::SingleSignOn)
    {
        capabilities.push(Operation::SingleSignOn);
    }

    let mut config_fields = Vec::with_capacity(config.len());
    for (name, entry) in config {
        let entry = entry
            .as_object()
            .ok_or_else(|| invalid("ConfigOptions entries must be objects"))?;
        let field_type = match str_field(entry, "Type").unwrap_or("text") {
            "password" => FieldType::Password,
            "yesno" => FieldType::Boolean,
            "dropdown" | "radio" => FieldType::Enum,
            _ => FieldType::Text,
        };
        let options: Vec<String> = match entry.get("Options") {
            Some(Value::String(s)) => s.split(',').map(|o| o.trim().to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        let default = str_field(entry, "Default").map(|d| match field_type {
            FieldType::Boolean => (d == "on" || d == "yes").to_string(),
            _ => d.to_string(),
        });
        config_fields.push(ConfigField {
            name: name.clone(),
            friendly_name: str_field(entry, "FriendlyName")
                .unwrap_or(name.as_str())
                .to_string(),
            field_type,
            options,
            default,
            description: str_field(entry, "Description").map(ToString::to_string),
            required: false,
            rule: None,
        });
    }

    Ok(ModuleMetadata {
        id: module_id.to_string(),
        display_name: str_field(meta, "DisplayName")
            .unwrap_or(module_id)
            .to_string(),
        api_version: str_field(meta, "APIVersion").unwrap_or("1.0").to_string(),
        module_type,
        capabilities,
        default_non_ssl_port: parse_port(meta, "DefaultNonSSLPort"),
        default_ssl_port: parse_port(meta, "DefaultSSLPort"),
        sso_label: str_field(meta, "ServiceSingleSignOnLabel").map(ToString::to_string),
        admin_sso_label: str_field(meta, "AdminSingleSignOnLabel").map(ToString::to_string),
        config_fields,
    })
}

/// Interprets a legacy module result.
///
/// `"success"` and `{"success": true}` are success; `{"error": "..."}` and any other
/// string are the provider's error message.
pub fn parse_result(provider: &str, result: &Value) -> Result<()> {
    let failure = |message: String| ModuleError::Unknown {
        provider: provider.to_string(),
        raw_code: None,
        raw_message: message,
    };
    match result {
        Value::String(s) if s.eq_ignore_ascii_case("success") => Ok(()),
        Value::String(s) => Err(failure(s.clone())),
        Value::Object(obj) => {
            if let Some(error) = str_field(obj, "error") {
                return Err(failure(error.to_string()));
            }
            match obj.get("success") {
                Some(Value::Bool(true)) => Ok(()),
                Some(Value::String(s)) if s == "1" || s.eq_ignore_ascii_case("true") => Ok(()),
                // 没有 error 字段的数组（如 GetNameservers 的返回）视为成功
                None => Ok(()),
                Some(other) => Err(failure(format!("Unexpected success value: {other}"))),
            }
        }
        other => Err(ModuleError::ParseError {
            provider: provider.to_string(),
            detail: format!("Unexpected result shape: {other}"),
        }),
    }
}
