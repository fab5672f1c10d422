//! Notification boundary

use tokio::sync::broadcast;

use crate::types::ProvisioningEvent;

/// Receives every committed state change, expiry correction and operator alert.
///
/// Publishing never fails the transition that produced the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ProvisioningEvent);
}

/// Writes events to the log. Default sink when nothing subscribes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn publish(&self, event: ProvisioningEvent) {
        match &event {
            ProvisioningEvent::StateChanged(change) => log::info!(
                "Service {}: {} -> {} ({})",
                change.service_id,
                change.old_state,
                change.new_state,
                change.reason
            ),
            ProvisioningEvent::OperatorAlert(alert) => log::error!(
                "OPERATOR ALERT for service {}: {} via {} failed after {} attempt(s): {}",
                alert.service_id,
                alert.operation,
                alert.module_id,
                alert.attempts,
                alert.message
            ),
            ProvisioningEvent::ExpiryUpdated {
                service_id,
                old,
                new,
            } => log::info!("Service {service_id}: expiry {old:?} -> {new}"),
        }
    }
}

/// Fan-out over a tokio broadcast channel; the mailer subscribes.
///
/// Events are also logged. A send with no live subscriber is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ProvisioningEvent>,
}

impl BroadcastEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: ProvisioningEvent) {
        LoggingEventSink.publish(event.clone());
        if self.sender.send(event).is_err() {
            log::debug!("No event subscribers");
        }
    }
}
