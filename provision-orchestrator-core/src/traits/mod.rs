//! Storage and notification abstraction trait definition

mod call_log_repository;
mod event_sink;
mod service_repository;

pub use call_log_repository::{CallLogRepository, InMemoryCallLogRepository};
pub use event_sink::{BroadcastEventSink, EventSink, LoggingEventSink};
pub use service_repository::{InMemoryServiceRepository, ServiceRepository};
