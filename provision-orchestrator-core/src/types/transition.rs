//! Lifecycle transition types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use provision_orchestrator_module::Operation;

use super::{Service, ServiceState};

/// Provider truth that disagrees with local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Discrepancy {
    /// Provider reports the resource expired while it is active locally.
    Expired,
    /// The domain left this registrar account.
    TransferredAway,
    /// A transfer-in finished at the registrar.
    TransferCompleted,
    /// A transfer-in was rejected or cancelled at the registrar.
    TransferFailed,
}

/// What triggered a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransitionReason {
    OrderPaid,
    InvoiceOverdue,
    PaymentReceived,
    Cancellation,
    GracePeriodExpired,
    PlanChange,
    AdminAction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Reconciliation {
        discrepancy: Discrepancy,
    },
    /// Admin "retry transition" on a failed service.
    ManualRetry,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderPaid => f.write_str("order paid"),
            Self::InvoiceOverdue => f.write_str("invoice overdue"),
            Self::PaymentReceived => f.write_str("payment received"),
            Self::Cancellation => f.write_str("cancellation"),
            Self::GracePeriodExpired => f.write_str("grace period expired"),
            Self::PlanChange => f.write_str("plan change"),
            Self::AdminAction { note: Some(note) } => write!(f, "admin action: {note}"),
            Self::AdminAction { note: None } => f.write_str("admin action"),
            Self::Reconciliation {
                discrepancy: Discrepancy::Expired,
            } => f.write_str("reconciliation: expired at provider"),
            Self::Reconciliation {
                discrepancy: Discrepancy::TransferredAway,
            } => f.write_str("reconciliation: transferred away"),
            Self::Reconciliation {
                discrepancy: Discrepancy::TransferCompleted,
            } => f.write_str("reconciliation: transfer completed"),
            Self::Reconciliation {
                discrepancy: Discrepancy::TransferFailed,
            } => f.write_str("reconciliation: transfer failed"),
            Self::ManualRetry => f.write_str("manual retry"),
        }
    }
}

/// Whether the module must be called for a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemotePolicy {
    /// Call the module operation the transition maps to.
    #[default]
    Invoke,
    /// The provider is already in the target state; record it locally only.
    AlreadyApplied,
}

/// Unit of work the orchestrator executes. Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub id: Uuid,
    pub service_id: String,
    pub target: ServiceState,
    pub reason: TransitionReason,
    #[serde(default)]
    pub remote: RemotePolicy,
}

impl TransitionRequest {
    pub fn new(service_id: impl Into<String>, target: ServiceState, reason: TransitionReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id: service_id.into(),
            target,
            reason,
            remote: RemotePolicy::Invoke,
        }
    }

    #[must_use]
    pub fn already_applied(mut self) -> Self {
        self.remote = RemotePolicy::AlreadyApplied;
        self
    }
}

/// How a transition is carried out, decided from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Already in the target state.
    NoOp,
    /// Commit locally without calling a module.
    LocalOnly,
    /// Call this module operation, then commit.
    Remote(Operation),
}

/// Result of an executed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub transition_id: Uuid,
    pub from: ServiceState,
    pub service: Service,
    /// `false` when the service was already in the target state.
    pub applied: bool,
    /// Module calls made, retries and sync checks included.
    pub module_calls: u32,
}
