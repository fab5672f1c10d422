//! Service persistence abstract Trait

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreResult;
use crate::types::{Service, ServiceQuery, ServiceState};

/// Service repository Trait
///
/// Services are never hard-deleted; terminal states stay for audit, so there is no
/// `delete`.
///
/// Platform implementation:
/// - `InMemoryServiceRepository` (tests, embedding)
/// - `SqliteServiceRepository` (`SeaORM`, app crate)
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    /// Get service based on ID
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Service>>;

    /// Services matching a filter, oldest first
    async fn find(&self, query: &ServiceQuery) -> CoreResult<Vec<Service>>;

    /// Save service (new or update)
    async fn save(&self, service: &Service) -> CoreResult<()>;

    /// Services in any of the given states
    async fn find_by_states(&self, states: &[ServiceState]) -> CoreResult<Vec<Service>> {
        self.find(&ServiceQuery {
            states: states.to_vec(),
            ..ServiceQuery::default()
        })
        .await
    }
}

/// In-memory service repository
#[derive(Clone, Default)]
pub struct InMemoryServiceRepository {
    services: Arc<RwLock<HashMap<String, Service>>>,
}

impl InMemoryServiceRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Service>> {
        Ok(self.services.read().await.get(id).cloned())
    }

    async fn find(&self, query: &ServiceQuery) -> CoreResult<Vec<Service>> {
        let mut matched: Vec<Service> = self
            .services
            .read()
            .await
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn save(&self, service: &Service) -> CoreResult<()> {
        self.services
            .write()
            .await
            .insert(service.id.clone(), service.clone());
        Ok(())
    }
}
