//! 服务（已购买的托管账户或域名）相关类型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use provision_orchestrator_module::{CreateAccountRequest, ErrorCategory, Operation};

use super::TransitionReason;

/// `provider_meta` key holding the id of a transfer-in that has not completed yet.
pub const TRANSFER_ID_META: &str = "transferId";

/// Lifecycle state of a service.
///
/// `pending → active → suspended → terminated`, plus the `failed` sink a transition
/// enters when its module call is rejected or runs out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Pending,
    Active,
    Suspended,
    Terminated,
    Failed,
}

impl ServiceState {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Active,
        Self::Suspended,
        Self::Terminated,
        Self::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// `terminated` is never followed by any other state.
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }

    /// States the reconciliation sweep checks against the provider.
    pub fn is_reconciled(self) -> bool {
        matches!(self, Self::Active | Self::Suspended)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product category. Domain sub-operations only apply to `Domain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Hosting,
    Domain,
}

impl ServiceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hosting => "hosting",
            Self::Domain => "domain",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hosting" => Some(Self::Hosting),
            "domain" => Some(Self::Domain),
            _ => None,
        }
    }
}

/// Why a service sits in `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    /// Module operation that failed.
    pub operation: Operation,
    pub category: ErrorCategory,
    /// `at {provider}, {operation} failed: {message}`
    pub message: String,
    /// State the failed transition started from. A retry is planned against it.
    pub from_state: ServiceState,
    /// State the failed transition was heading to.
    pub target_state: ServiceState,
    /// Attempts made before giving up.
    pub attempts: u32,
    #[serde(with = "crate::utils::datetime")]
    pub failed_at: DateTime<Utc>,
}

/// A purchased unit under management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub client_id: String,
    pub product_id: String,
    /// Module bound through the product at registration.
    pub module_id: String,
    pub category: ServiceCategory,
    pub state: ServiceState,
    /// Set once by a successful create, immutable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Provider data returned by create (assigned IP, order id).
    #[serde(default)]
    pub provider_meta: std::collections::BTreeMap<String, String>,
    /// Parameters the resource was (or will be) created with.
    pub resources: CreateAccountRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<TransitionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    /// Incremented on every committed change.
    pub version: u64,
    #[serde(with = "crate::utils::datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::utils::datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// The state transitions are planned against: a failed service is retried from the
    /// state its failure interrupted.
    pub fn effective_state(&self) -> ServiceState {
        match (self.state, &self.failure) {
            (ServiceState::Failed, Some(failure)) => failure.from_state,
            (state, _) => state,
        }
    }

    /// Id of the transfer-in a pending domain order is waiting on.
    pub fn pending_transfer(&self) -> Option<&str> {
        if self.effective_state() != ServiceState::Pending || self.external_id.is_some() {
            return None;
        }
        self.provider_meta.get(TRANSFER_ID_META).map(String::as_str)
    }

    /// A transfer-in order, in flight or failed. It is activated by a transfer, never
    /// by a registration.
    pub fn is_transfer_in(&self) -> bool {
        self.pending_transfer().is_some()
            || self
                .failure
                .as_ref()
                .is_some_and(|f| f.operation == Operation::TransferDomain)
    }

    /// Days between the local and the given expiry date, `None` when either is unknown.
    pub fn expiry_drift_days(&self, remote: Option<NaiveDate>) -> Option<i64> {
        match (self.expiry_date, remote) {
            (Some(local), Some(remote)) => Some((remote - local).num_days().abs()),
            _ => None,
        }
    }
}

/// Billing's "order paid" input: a service to create in `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub client_id: String,
    pub product_id: String,
    pub resources: CreateAccountRequest,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// Filter for admin listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuery {
    #[serde(default)]
    pub states: Vec<ServiceState>,
    pub client_id: Option<String>,
    pub product_id: Option<String>,
}

impl ServiceQuery {
    pub fn matches(&self, service: &Service) -> bool {
        (self.states.is_empty() || self.states.contains(&service.state))
            && self
                .client_id
                .as_ref()
                .is_none_or(|c| *c == service.client_id)
            && self
                .product_id
                .as_ref()
                .is_none_or(|p| *p == service.product_id)
    }
}
