//! Local writes that failed after the remote call succeeded
//!
//! They are never rolled back remotely; the next reconciliation pass re-applies them.
//! Until then [`ServiceContext::get_service`](super::ServiceContext::get_service)
//! serves the queued version.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::types::{Service, StateChange};

#[derive(Debug, Clone)]
pub struct DeferredWrite {
    /// The service as it should be stored.
    pub service: Service,
    /// Event to emit once the write lands.
    pub event: Option<StateChange>,
    pub error: String,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct DeferredWriteQueue {
    queue: Mutex<VecDeque<DeferredWrite>>,
}

impl DeferredWriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DeferredWrite>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a write. An older queued version of the same service is replaced, its
    /// event carried over so subscribers still see every change.
    pub fn push(&self, mut write: DeferredWrite) {
        log::warn!(
            "Deferring local write for service {} (version {}): {}",
            write.service.id,
            write.service.version,
            write.error
        );
        let mut queue = self.lock();
        if let Some(pos) = queue.iter().position(|w| w.service.id == write.service.id) {
            if let Some(older) = queue.remove(pos) {
                if write.event.is_none() {
                    write.event = older.event;
                }
            }
        }
        queue.push_back(write);
    }

    /// Queued writes, oldest first. The queue is left untouched.
    pub fn snapshot(&self) -> Vec<DeferredWrite> {
        self.lock().iter().cloned().collect()
    }

    /// Removes the queued write for `service_id` if it is at `version` or older.
    ///
    /// Called once that version (or a newer one) is stored.
    pub fn settle(&self, service_id: &str, version: u64) -> Option<DeferredWrite> {
        let mut queue = self.lock();
        let pos = queue
            .iter()
            .position(|w| w.service.id == service_id && w.service.version <= version)?;
        queue.remove(pos)
    }

    /// Notes another failed attempt at a queued write.
    pub fn record_failure(&self, service_id: &str, error: &str) {
        if let Some(write) = self
            .lock()
            .iter_mut()
            .find(|w| w.service.id == service_id)
        {
            write.attempts += 1;
            write.error = error.to_string();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending write for a service, if any.
    pub fn pending_for(&self, service_id: &str) -> Option<Service> {
        self.lock()
            .iter()
            .find(|w| w.service.id == service_id)
            .map(|w| w.service.clone())
    }
}
