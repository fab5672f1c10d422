//! Bounded exponential backoff for transient module failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on a provider-requested `retry_after` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Retry bound and backoff. The bound is a deployment parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Wait before the attempt after `attempt`: `base * 2^(attempt-1)`, capped, and never
    /// shorter than a provider's `retry_after` (itself capped at 30s).
    pub fn delay_after(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        match retry_after {
            Some(secs) => backoff.max(Duration::from_secs(secs).min(MAX_RETRY_AFTER)),
            None => backoff,
        }
    }
}
