//! Provision Orchestrator Core Library
//!
//! Drives provisioned services (hosting accounts, domains) through their lifecycle
//! against provider modules:
//! - Module registry and configuration resolution
//! - Lifecycle orchestrator with per-service leases and classified retries
//! - Call logger (every module call recorded, secrets redacted)
//! - Reconciliation scheduler
//! - SSO issuer, domain management and admin services
//!
//! Storage and notification are traits; the app crate plugs in `SQLite` and a broadcast sink.

pub mod error;
pub mod registry;
pub mod services;
pub mod settings;
pub mod traits;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Re-export common types
pub use error::{CallFailure, CoreError, CoreResult};
pub use registry::{ModuleConstructor, ModuleRegistry, ResolvedModule};
pub use services::ServiceContext;
pub use settings::OrchestratorSettings;
pub use traits::{CallLogRepository, EventSink, ServiceRepository};
