//! Orchestrator tuning parameters
//!
//! Deployment parameters, not protocol requirements. The app crate reads them from the
//! `[retry]`, `[timeouts]` and `[reconciliation]` TOML tables.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub reconciliation: ReconciliationSettings,
}

/// Backoff for transient and ambiguous failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per transition, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms.max(settings.base_delay_ms)),
        }
    }
}

/// Per-call timeouts. A call still running when its timeout fires is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default_secs: u64,
    /// Overrides keyed by module id.
    pub modules: BTreeMap<String, u64>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_secs: 90,
            modules: BTreeMap::new(),
        }
    }
}

impl TimeoutSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs.max(1))
    }

    pub fn module_timeouts(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.modules
            .iter()
            .map(|(id, secs)| (id.as_str(), Duration::from_secs((*secs).max(1))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationSettings {
    pub interval_secs: u64,
    /// Expiry differences up to this many days are ignored.
    pub expiry_tolerance_days: i64,
    /// Services synced in parallel during one pass.
    pub concurrency: usize,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            expiry_tolerance_days: 1,
            concurrency: 8,
        }
    }
}

impl ReconciliationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_keep_defaults() {
        let settings: OrchestratorSettings =
            serde_json::from_str(r#"{"retry":{"max_attempts":3},"timeouts":{"modules":{"namecheap":30}}}"#)
                .unwrap();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.base_delay_ms, 1_000);
        assert_eq!(settings.timeouts.default_secs, 90);
        assert_eq!(
            settings.timeouts.module_timeouts().collect::<Vec<_>>(),
            vec![("namecheap", Duration::from_secs(30))]
        );
    }

    #[test]
    fn retry_policy_never_allows_zero_attempts() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 5,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, Duration::from_millis(10));
    }
}
