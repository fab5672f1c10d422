//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

// Re-export library error type
pub use provision_orchestrator_module::{ConfigFieldError, ErrorCategory, ModuleError};

use provision_orchestrator_module::Operation;

use crate::types::ServiceState;

/// A classified module call failure, as surfaced to billing and admins.
///
/// Always names the provider and the operation; the message is the provider's own,
/// with secrets redacted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFailure {
    pub provider: String,
    pub operation: Operation,
    pub category: ErrorCategory,
    /// `ModuleError` code (`Timeout`, `ResourceNotFound`, ...).
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl CallFailure {
    pub fn is_not_found(&self) -> bool {
        self.code == "ResourceNotFound"
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "at {}, {} failed: {}",
            self.provider, self.operation, self.message
        )
    }
}

/// Core layer error type
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum CoreError {
    /// Configuration rejected before any remote call
    #[error("Configuration error in '{field}': {reason}")]
    Configuration { field: String, reason: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product is not active: {0}")]
    ProductInactive(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: ServiceState, to: ServiceState },

    /// The bound module does not declare the capability
    #[error("Module '{module}' does not support {operation}")]
    CapabilityNotSupported { module: String, operation: Operation },

    /// Classified module failure
    #[error("{0}")]
    ModuleCall(CallFailure),

    /// The session may not act on this service
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Remote call succeeded, local write failed; queued for the next reconciliation pass
    #[error("Local write for service {service_id} deferred to reconciliation: {detail}")]
    PersistenceDeferred { service_id: String, detail: String },

    /// Storage layer error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Background transition worker stopped unexpectedly
    #[error("Transition worker failed: {0}")]
    WorkerFailed(String),

    /// Module error outside a logged call (construction)
    #[error("{0}")]
    Module(#[from] ModuleError),
}

impl From<ConfigFieldError> for CoreError {
    fn from(e: ConfigFieldError) -> Self {
        Self::Configuration {
            field: e.field,
            reason: e.reason,
        }
    }
}

impl From<CallFailure> for CoreError {
    fn from(failure: CallFailure) -> Self {
        Self::ModuleCall(failure)
    }
}

impl CoreError {
    /// 是否为预期行为（用户输入、资源不存在等），用于日志分级。
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::ModuleNotFound(_)
            | Self::ProductNotFound(_)
            | Self::ProductInactive(_)
            | Self::ServerNotFound(_)
            | Self::ServiceNotFound(_)
            | Self::Validation(_)
            | Self::InvalidTransition { .. }
            | Self::CapabilityNotSupported { .. }
            | Self::Forbidden(_) => true,
            Self::ModuleCall(failure) => failure.category == ErrorCategory::Rejected,
            Self::Module(e) => e.is_expected(),
            _ => false,
        }
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;
