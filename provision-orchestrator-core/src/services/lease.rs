//! Per-service exclusive leases
//!
//! Every transition for a service runs while holding that service's lease. Different
//! services never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one transition. Dropping it releases the service.
#[derive(Debug)]
pub struct ServiceLease {
    service_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl ServiceLease {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

#[derive(Debug, Default)]
pub struct LeaseManager {
    leases: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LeaseManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, service_id: &str) -> Arc<AsyncMutex<()>> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(leases.entry(service_id.to_string()).or_default())
    }

    /// Waits until the service is free, then takes its lease.
    pub async fn acquire(&self, service_id: &str) -> ServiceLease {
        let guard = self.slot(service_id).lock_owned().await;
        ServiceLease {
            service_id: service_id.to_string(),
            _guard: guard,
        }
    }

    /// Takes the lease only if nobody holds it.
    pub fn try_acquire(&self, service_id: &str) -> Option<ServiceLease> {
        let guard = self.slot(service_id).try_lock_owned().ok()?;
        Some(ServiceLease {
            service_id: service_id.to_string(),
            _guard: guard,
        })
    }

    pub fn is_held(&self, service_id: &str) -> bool {
        let leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        leases
            .get(service_id)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Drops slots nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        let before = leases.len();
        leases.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - leases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let leases = Arc::new(LeaseManager::new());
        let first = leases.acquire("svc-1").await;
        assert!(leases.try_acquire("svc-1").is_none());
        assert!(leases.is_held("svc-1"));

        let waiter = {
            let leases = Arc::clone(&leases);
            tokio::spawn(async move { leases.acquire("svc-1").await.service_id().to_string() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), "svc-1");
    }

    #[tokio::test]
    async fn different_services_do_not_contend() {
        let leases = LeaseManager::new();
        let _a = leases.acquire("svc-a").await;
        assert!(leases.try_acquire("svc-b").is_some());
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let leases = LeaseManager::new();
        let held = leases.acquire("svc-a").await;
        drop(leases.acquire("svc-b").await);
        assert_eq!(leases.prune(), 1);
        assert!(leases.is_held("svc-a"));
        drop(held);
    }
}
