//! Events emitted to subscribers (mailer, admin dashboards)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use provision_orchestrator_module::Operation;

use super::{ServiceState, TransitionReason};

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub service_id: String,
    pub old_state: ServiceState,
    pub new_state: ServiceState,
    pub reason: TransitionReason,
    pub transition_id: Uuid,
    #[serde(with = "crate::utils::datetime")]
    pub at: DateTime<Utc>,
}

/// Something an operator has to look at (a termination that could not be completed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorAlert {
    pub service_id: String,
    pub module_id: String,
    pub operation: Operation,
    pub message: String,
    pub attempts: u32,
    #[serde(with = "crate::utils::datetime")]
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProvisioningEvent {
    StateChanged(StateChange),
    OperatorAlert(OperatorAlert),
    /// Expiry corrected from provider truth, no lifecycle change.
    ExpiryUpdated {
        service_id: String,
        old: Option<NaiveDate>,
        new: NaiveDate,
    },
}

impl ProvisioningEvent {
    pub fn service_id(&self) -> &str {
        match self {
            Self::StateChanged(change) => &change.service_id,
            Self::OperatorAlert(alert) => &alert.service_id,
            Self::ExpiryUpdated { service_id, .. } => service_id,
        }
    }
}
