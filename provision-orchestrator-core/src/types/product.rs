//! Server and product bindings resolved by the module registry

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ServiceCategory;

/// A provider endpoint with its credentials (a DirectAdmin host, a registrar account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    pub module_id: String,
    #[serde(default)]
    pub name: String,
    /// Per-server configuration values. These win over product values.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Binds a sellable product to exactly one module (and optionally one server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBinding {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub category: ServiceCategory,
    /// Per-product configuration overrides (package, limits).
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    /// Set once a connection test has passed.
    #[serde(default)]
    pub active: bool,
}
