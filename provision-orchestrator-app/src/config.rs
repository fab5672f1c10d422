//! Deployment settings (TOML)
//!
//! ```toml
//! [database]
//! path = "/var/lib/provisiond/provisiond.db"
//!
//! [retry]
//! max_attempts = 5
//!
//! [reconciliation]
//! interval_secs = 3600
//!
//! [[servers]]
//! id = "da1"
//! module = "directadmin"
//! values = { hostname = "da1.example.com", username = "admin", password = "..." }
//!
//! [[products]]
//! id = "starter"
//! module = "directadmin"
//! server = "da1"
//! category = "hosting"
//! overrides = { package = "starter", quota = 1000 }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use provision_orchestrator_core::error::{CoreError, CoreResult};
use provision_orchestrator_core::settings::OrchestratorSettings;
use provision_orchestrator_core::types::{ProductBinding, ServerConfig, ServiceCategory};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    /// `[retry]`, `[timeouts]` and `[reconciliation]`
    #[serde(flatten)]
    pub orchestrator: OrchestratorSettings,
    pub servers: Vec<ServerSection>,
    pub products: Vec<ProductSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("provisiond.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSection {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub server: Option<String>,
    pub category: ServiceCategory,
    #[serde(default)]
    pub overrides: BTreeMap<String, toml::Value>,
}

impl Settings {
    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::Configuration {
            field: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> CoreResult<Self> {
        toml::from_str(raw).map_err(|e| CoreError::Configuration {
            field: "settings".to_string(),
            reason: e.to_string(),
        })
    }
}

impl ServerSection {
    pub fn to_server_config(&self) -> CoreResult<ServerConfig> {
        Ok(ServerConfig {
            id: self.id.clone(),
            module_id: self.module.clone(),
            name: self.name.clone(),
            values: scalar_values(&format!("servers.{}", self.id), &self.values)?,
        })
    }
}

impl ProductSection {
    /// Products start inactive until their connection test passes.
    pub fn to_binding(&self) -> CoreResult<ProductBinding> {
        Ok(ProductBinding {
            id: self.id.clone(),
            name: self.name.clone(),
            module_id: self.module.clone(),
            server_id: self.server.clone(),
            category: self.category,
            overrides: scalar_values(&format!("products.{}", self.id), &self.overrides)?,
            active: false,
        })
    }
}

/// Module configuration is string-typed; TOML scalars are rendered, tables refused.
fn scalar_values(
    section: &str,
    values: &BTreeMap<String, toml::Value>,
) -> CoreResult<BTreeMap<String, String>> {
    values
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => {
                    return Err(CoreError::Configuration {
                        field: format!("{section}.{key}"),
                        reason: "expected a string, number or boolean".to_string(),
                    })
                }
            };
            Ok((key.clone(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[database]
path = "/tmp/provisiond-test.db"

[retry]
max_attempts = 3
base_delay_ms = 500

[timeouts]
default_secs = 30
modules = { namecheap = 120 }

[reconciliation]
interval_secs = 600

[[servers]]
id = "da1"
module = "directadmin"
values = { hostname = "da1.example.com", port = 2222, secure = true }

[[products]]
id = "starter"
module = "directadmin"
server = "da1"
category = "hosting"
overrides = { package = "starter", quota = 1000 }

[[products]]
id = "com"
module = "namecheap"
category = "domain"
"#;

    #[test]
    fn parses_full_settings() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("/tmp/provisiond-test.db"));
        assert_eq!(settings.orchestrator.retry.max_attempts, 3);
        assert_eq!(settings.orchestrator.retry.max_delay_ms, 60_000);
        assert_eq!(settings.orchestrator.timeouts.modules.get("namecheap"), Some(&120));
        assert_eq!(settings.orchestrator.reconciliation.interval_secs, 600);

        let server = settings.servers[0].to_server_config().unwrap();
        assert_eq!(server.values.get("port").map(String::as_str), Some("2222"));
        assert_eq!(server.values.get("secure").map(String::as_str), Some("true"));

        let product = settings.products[0].to_binding().unwrap();
        assert_eq!(product.overrides.get("quota").map(String::as_str), Some("1000"));
        assert!(!product.active);
        assert_eq!(settings.products[1].category, ServiceCategory::Domain);
        assert!(settings.products[1].server.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.database.path, PathBuf::from("provisiond.db"));
        assert_eq!(settings.orchestrator, OrchestratorSettings::default());
        assert!(settings.products.is_empty());
    }

    #[test]
    fn nested_values_are_refused() {
        let settings = Settings::parse(
            r#"
[[servers]]
id = "da1"
module = "directadmin"
values = { hostname = { nested = true } }
"#,
        )
        .unwrap();
        let err = settings.servers[0].to_server_config().unwrap_err();
        assert!(err.to_string().contains("servers.da1.hostname"));
    }
}
