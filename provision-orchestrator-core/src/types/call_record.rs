//! Module call record types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use provision_orchestrator_module::{ErrorCategory, LookupCache, Normalization, Operation};

/// Classified outcome of one module call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    Success,
    Transient,
    Rejected,
    Ambiguous,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Ambiguous => "ambiguous",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "transient" => Some(Self::Transient),
            "rejected" => Some(Self::Rejected),
            "ambiguous" => Some(Self::Ambiguous),
            _ => None,
        }
    }
}

impl From<ErrorCategory> for CallOutcome {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Transient => Self::Transient,
            ErrorCategory::Rejected => Self::Rejected,
            ErrorCategory::Ambiguous => Self::Ambiguous,
        }
    }
}

/// Where a call belongs: the service and transition that caused it.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    pub service_id: Option<String>,
    pub transition_id: Option<Uuid>,
    /// 1-based attempt number within the transition.
    pub attempt: u32,
    /// Request values to redact in addition to the module's secret config fields.
    pub secrets: Vec<String>,
    /// Shared by every call made for one transition.
    pub cache: Arc<LookupCache>,
}

impl CallScope {
    pub fn service(service_id: impl Into<String>) -> Self {
        Self {
            service_id: Some(service_id.into()),
            attempt: 1,
            ..Self::default()
        }
    }

    pub fn transition(service_id: impl Into<String>, transition_id: Uuid) -> Self {
        Self {
            service_id: Some(service_id.into()),
            transition_id: Some(transition_id),
            attempt: 1,
            ..Self::default()
        }
    }

    /// A call not tied to any service (connection tests).
    pub fn standalone() -> Self {
        Self {
            attempt: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: Option<&str>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.secrets.push(secret.to_string());
        }
        self
    }

    /// The correlation id shared by the scope's calls.
    pub fn correlation_id(&self) -> Uuid {
        self.transition_id.unwrap_or_else(Uuid::new_v4)
    }
}

/// One outbound module call.
///
/// Written before the call with `outcome: None`, then completed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: Uuid,
    /// Links every call made for one transition (or one standalone request).
    pub correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_id: Option<Uuid>,
    pub module_id: String,
    pub operation: Operation,
    pub attempt: u32,
    /// Redacted request payload (JSON).
    pub request: String,
    /// SHA-256 of `module_id`, operation and request.
    pub fingerprint: String,
    /// Redacted raw exchanges, or a reference only for secret-bearing responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    /// Parsed result summary on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
    #[serde(with = "crate::utils::datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "crate::utils::datetime::option")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }

    /// Open calls and ambiguous outcomes: the remote effect is unknown.
    pub fn is_unresolved(&self) -> bool {
        matches!(self.outcome, None | Some(CallOutcome::Ambiguous))
    }

    /// Whether success was inferred by an adapter heuristic rather than reported.
    pub fn is_heuristic(&self) -> bool {
        self.normalization
            .as_ref()
            .is_some_and(Normalization::is_heuristic)
    }
}

/// The second and final write of a call record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCompletion {
    pub outcome: CallOutcome,
    pub response: Option<String>,
    pub result_summary: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub normalization: Option<Normalization>,
    #[serde(with = "crate::utils::datetime")]
    pub finished_at: DateTime<Utc>,
}

impl CallRecord {
    /// Applies a completion. Callers guarantee this happens once.
    pub fn apply(&mut self, completion: CallCompletion) {
        self.outcome = Some(completion.outcome);
        self.response = completion.response;
        self.result_summary = completion.result_summary;
        self.error_code = completion.error_code;
        self.error_message = completion.error_message;
        self.normalization = completion.normalization;
        self.finished_at = Some(completion.finished_at);
    }
}
