//! Module call log persistence abstract Trait

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::types::{CallCompletion, CallRecord, Operation};

/// Call log repository Trait
///
/// Records are append-only: `insert` writes the open record, `complete` writes the
/// outcome once. Completing a record twice is an error.
#[async_trait]
pub trait CallLogRepository: Send + Sync {
    async fn insert(&self, record: &CallRecord) -> CoreResult<()>;

    async fn complete(&self, id: Uuid, completion: &CallCompletion) -> CoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<CallRecord>>;

    /// Calls made for a service, in call order
    async fn find_by_service(&self, service_id: &str) -> CoreResult<Vec<CallRecord>>;

    /// Calls that were started and never completed
    async fn find_open(&self) -> CoreResult<Vec<CallRecord>>;

    /// Calls whose remote effect is unknown (open or ambiguous) for one service and operation
    async fn find_unresolved(
        &self,
        service_id: &str,
        operation: Operation,
    ) -> CoreResult<Vec<CallRecord>> {
        Ok(self
            .find_by_service(service_id)
            .await?
            .into_iter()
            .filter(|r| r.operation == operation && r.is_unresolved())
            .collect())
    }
}

/// In-memory call log
#[derive(Clone, Default)]
pub struct InMemoryCallLogRepository {
    records: Arc<RwLock<Vec<CallRecord>>>,
}

impl InMemoryCallLogRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallLogRepository for InMemoryCallLogRepository {
    async fn insert(&self, record: &CallRecord) -> CoreResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn complete(&self, id: Uuid, completion: &CallCompletion) -> CoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::StorageError(format!("call record {id} not found")))?;
        if !record.is_open() {
            return Err(CoreError::StorageError(format!(
                "call record {id} is already completed"
            )));
        }
        record.apply(completion.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<CallRecord>> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_service(&self, service_id: &str) -> CoreResult<Vec<CallRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.service_id.as_deref() == Some(service_id))
            .cloned()
            .collect())
    }

    async fn find_open(&self) -> CoreResult<Vec<CallRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_open())
            .cloned()
            .collect())
    }
}
