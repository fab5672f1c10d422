//! DirectAdmin server module

mod error;
mod http;
mod module;

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::http_client::create_http_client;
use crate::modules::common::require_config;
use crate::types::ModuleConfig;

pub(crate) use http::DaResponse;

pub(crate) const PROVIDER: &str = "directadmin";
pub(crate) const DEFAULT_PORT: u16 = 2222;
/// DirectAdmin account creation regularly takes longer than a plain API read.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// DirectAdmin hosting control panel.
///
/// Talks to the legacy `CMD_API_*` endpoints: form-encoded POST with HTTP basic auth,
/// url-encoded responses.
pub struct DirectAdminModule {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) admin_user: String,
    pub(crate) admin_password: String,
    pub(crate) config: ModuleConfig,
}

impl DirectAdminModule {
    pub fn new(config: &ModuleConfig) -> Result<Self> {
        let hostname = require_config(config, PROVIDER, "hostname")?;
        let port = config.get_u16("port").unwrap_or(DEFAULT_PORT);
        let scheme = if config.get("secure").is_none() || config.get_bool("secure") {
            "https"
        } else {
            "http"
        };
        Ok(Self {
            client: create_http_client(PROVIDER, REQUEST_TIMEOUT)?,
            base_url: format!("{scheme}://{hostname}:{port}"),
            admin_user: require_config(config, PROVIDER, "username")?.to_string(),
            admin_password: require_config(config, PROVIDER, "password")?.to_string(),
            config: config.clone(),
        })
    }
}
