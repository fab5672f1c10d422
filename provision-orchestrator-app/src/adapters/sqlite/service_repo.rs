//! `ServiceRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use provision_orchestrator_core::error::{CoreError, CoreResult};
use provision_orchestrator_core::traits::ServiceRepository;
use provision_orchestrator_core::types::{Service, ServiceQuery};

use super::entity::service;
use super::{timestamp, SqliteStore};

impl service::Model {
    /// The `data` column is authoritative; the other columns exist for queries.
    fn into_service(self) -> CoreResult<Service> {
        serde_json::from_str(&self.data).map_err(|e| {
            CoreError::SerializationError(format!("Invalid service row {}: {e}", self.id))
        })
    }
}

fn service_to_active_model(service: &Service) -> CoreResult<service::ActiveModel> {
    let data = serde_json::to_string(service)
        .map_err(|e| CoreError::SerializationError(e.to_string()))?;
    let version = i64::try_from(service.version)
        .map_err(|_| CoreError::SerializationError(format!("version {} out of range", service.version)))?;

    Ok(service::ActiveModel {
        id: Set(service.id.clone()),
        client_id: Set(service.client_id.clone()),
        product_id: Set(service.product_id.clone()),
        module_id: Set(service.module_id.clone()),
        category: Set(service.category.as_str().to_string()),
        state: Set(service.state.as_str().to_string()),
        external_id: Set(service.external_id.clone()),
        expiry_date: Set(service.expiry_date.map(|d| d.to_string())),
        version: Set(version),
        data: Set(data),
        created_at: Set(timestamp(&service.created_at)),
        updated_at: Set(timestamp(&service.updated_at)),
    })
}

#[async_trait]
impl ServiceRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Service>> {
        let row = service::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to query service: {e}")))?;

        row.map(service::Model::into_service).transpose()
    }

    async fn find(&self, query: &ServiceQuery) -> CoreResult<Vec<Service>> {
        let mut select = service::Entity::find();
        if !query.states.is_empty() {
            select = select.filter(
                service::Column::State.is_in(query.states.iter().map(|s| s.as_str())),
            );
        }
        if let Some(client_id) = &query.client_id {
            select = select.filter(service::Column::ClientId.eq(client_id.as_str()));
        }
        if let Some(product_id) = &query.product_id {
            select = select.filter(service::Column::ProductId.eq(product_id.as_str()));
        }

        let rows = select
            .order_by_asc(service::Column::CreatedAt)
            .order_by_asc(service::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to query services: {e}")))?;

        rows.into_iter().map(service::Model::into_service).collect()
    }

    async fn save(&self, service: &Service) -> CoreResult<()> {
        let active_model = service_to_active_model(service)?;

        service::Entity::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(service::Column::Id)
                    .update_columns([
                        service::Column::State,
                        service::Column::ExternalId,
                        service::Column::ExpiryDate,
                        service::Column::Version,
                        service::Column::Data,
                        service::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to save service: {e}")))?;

        Ok(())
    }
}
