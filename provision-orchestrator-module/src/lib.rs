//! # provision-orchestrator-module
//!
//! The provider module contract for service provisioning, plus reference adapters
//! for a hosting control panel and a domain registrar.
//!
//! A module is a stateless adapter: it receives a resolved [`ModuleConfig`] and a
//! [`CallContext`] per call, talks to exactly one remote API, and answers with a
//! typed result or a [`ModuleError`]. It never retries, never persists anything and
//! never decides lifecycle state. Those belong to the orchestrator.
//!
//! ## Supported Modules
//!
//! | Module | Feature Flag | Type | Transport |
//! |--------|-------------|------|-----------|
//! | [DirectAdmin](https://www.directadmin.com/) | `directadmin` | Server | `CMD_API_*`, basic auth |
//! | [Namecheap](https://www.namecheap.com/support/api/) | `namecheap` | Registrar | XML over GET |
//!
//! ## Feature Flags
//!
//! - **`all-modules`** *(default)*: Enable every module listed above.
//! - **`directadmin`** / **`namecheap`**: Enable a single module.
//! - **`native-tls`** *(default)* / **`rustls`**: TLS backend for `reqwest`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//!
//! use provision_orchestrator_module::{
//!     create_module, get_all_module_metadata, resolve_config, CallContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = get_all_module_metadata()
//!         .into_iter()
//!         .find(|m| m.id == "directadmin")
//!         .ok_or("directadmin disabled")?;
//!
//!     let server: BTreeMap<String, String> = [
//!         ("hostname", "da.example.com"),
//!         ("username", "admin"),
//!         ("password", "secret"),
//!     ]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//!     let config = resolve_config(&metadata, &[&server])?;
//!
//!     let module = create_module("directadmin", &config)?;
//!     module.test_connection(&CallContext::detached()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result<T, ModuleError>`](ModuleError). Each variant maps
//! to an [`ErrorCategory`] hint:
//!
//! - `Transient`: the request never took effect (connect refused, 429, 502-504).
//! - `Rejected`: the provider understood and refused.
//! - `Ambiguous`: the request may have been applied (read timeout, cut-off response).

mod config;
mod context;
mod error;
mod factory;
mod http_client;
mod modules;
mod traits;
mod types;
mod utils;
pub mod whmcs;

// Re-export error types
pub use error::{ErrorCategory, ModuleError, Result};

// Re-export factory functions
pub use factory::{create_module, get_all_module_metadata};

// Re-export the module contract (error mapping stays internal)
pub use traits::ProvisioningModule;

pub use config::{ConfigFieldError, resolve_config};
pub use context::{CallContext, Exchange, LookupCache};

// Re-export types
pub use types::{
    Ack, ConfigField, ContactDetails, CreateAccountRequest, CreatedAccount, DnsHostRecord,
    FieldType, ModuleConfig, ModuleMetadata, ModuleType, Normalization, Operation,
    RenewOutcome, ResourceChange, SsoToken, SyncStatus, TransferRequest, TransferStarted,
    TransferState, TransferStatus, ValueRule,
};

// Re-export utils modules
pub use utils::{datetime, log_sanitizer};

// Re-export concrete modules (behind feature flags)
#[cfg(feature = "directadmin")]
pub use modules::DirectAdminModule;

#[cfg(feature = "namecheap")]
pub use modules::NamecheapModule;
