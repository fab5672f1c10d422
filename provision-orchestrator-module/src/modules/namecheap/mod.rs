//! Namecheap registrar module

mod error;
mod http;
mod module;
mod xml;

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::http_client::create_http_client;
use crate::modules::common::require_config;
use crate::types::ModuleConfig;

pub(crate) use xml::XmlNode;

pub(crate) const PROVIDER: &str = "namecheap";
pub(crate) const LIVE_ENDPOINT: &str = "https://api.namecheap.com/xml.response";
pub(crate) const SANDBOX_ENDPOINT: &str = "https://api.sandbox.namecheap.com/xml.response";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Namecheap domain registrar.
///
/// Every command is a GET against `xml.response` carrying the global
/// `ApiUser`/`ApiKey`/`UserName`/`ClientIp` parameters.
pub struct NamecheapModule {
    pub(crate) client: Client,
    pub(crate) endpoint: &'static str,
    pub(crate) api_user: String,
    pub(crate) api_key: String,
    pub(crate) username: String,
    pub(crate) client_ip: String,
    pub(crate) promotional_code: Option<String>,
    pub(crate) whoisguard: bool,
}

impl NamecheapModule {
    pub fn new(config: &ModuleConfig) -> Result<Self> {
        let api_user = require_config(config, PROVIDER, "api_user")?.to_string();
        Ok(Self {
            client: create_http_client(PROVIDER, REQUEST_TIMEOUT)?,
            endpoint: if config.get_bool("test_mode") {
                SANDBOX_ENDPOINT
            } else {
                LIVE_ENDPOINT
            },
            api_key: require_config(config, PROVIDER, "api_key")?.to_string(),
            username: config.get("username").unwrap_or(api_user.as_str()).to_string(),
            client_ip: require_config(config, PROVIDER, "client_ip")?.to_string(),
            promotional_code: config.get("promotional_code").map(ToString::to_string),
            whoisguard: config.get("whoisguard").is_none() || config.get_bool("whoisguard"),
            api_user,
        })
    }
}
