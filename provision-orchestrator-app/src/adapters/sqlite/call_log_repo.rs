//! `CallLogRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use provision_orchestrator_core::error::{CoreError, CoreResult};
use provision_orchestrator_core::traits::CallLogRepository;
use provision_orchestrator_core::types::{
    CallCompletion, CallOutcome, CallRecord, Normalization, Operation,
};

use super::entity::call_record;
use super::{parse_timestamp, timestamp, SqliteStore};

fn parse_uuid(field: &str, raw: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| CoreError::SerializationError(format!("Invalid {field}: {e}")))
}

fn normalization_to_json(normalization: Option<&Normalization>) -> CoreResult<Option<String>> {
    normalization
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| CoreError::SerializationError(e.to_string()))
}

impl call_record::Model {
    fn into_record(self) -> CoreResult<CallRecord> {
        let operation = Operation::parse(&self.operation).ok_or_else(|| {
            CoreError::SerializationError(format!("Unknown operation: {}", self.operation))
        })?;
        let outcome = self
            .outcome
            .as_deref()
            .map(|raw| {
                CallOutcome::parse(raw).ok_or_else(|| {
                    CoreError::SerializationError(format!("Unknown call outcome: {raw}"))
                })
            })
            .transpose()?;
        let normalization = self
            .normalization
            .as_deref()
            .map(serde_json::from_str::<Normalization>)
            .transpose()
            .map_err(|e| CoreError::SerializationError(format!("Invalid normalization: {e}")))?;

        Ok(CallRecord {
            id: parse_uuid("id", &self.id)?,
            correlation_id: parse_uuid("correlation_id", &self.correlation_id)?,
            service_id: self.service_id,
            transition_id: self
                .transition_id
                .as_deref()
                .map(|raw| parse_uuid("transition_id", raw))
                .transpose()?,
            module_id: self.module_id,
            operation,
            attempt: u32::try_from(self.attempt).unwrap_or_default(),
            request: self.request,
            fingerprint: self.fingerprint,
            response: self.response,
            outcome,
            result_summary: self.result_summary,
            error_code: self.error_code,
            error_message: self.error_message,
            normalization,
            started_at: parse_timestamp("started_at", &self.started_at)?,
            finished_at: self
                .finished_at
                .as_deref()
                .map(|raw| parse_timestamp("finished_at", raw))
                .transpose()?,
        })
    }
}

fn record_to_active_model(record: &CallRecord) -> CoreResult<call_record::ActiveModel> {
    Ok(call_record::ActiveModel {
        id: Set(record.id.to_string()),
        correlation_id: Set(record.correlation_id.to_string()),
        service_id: Set(record.service_id.clone()),
        transition_id: Set(record.transition_id.map(|id| id.to_string())),
        module_id: Set(record.module_id.clone()),
        operation: Set(record.operation.as_str().to_string()),
        attempt: Set(i32::try_from(record.attempt).unwrap_or(i32::MAX)),
        request: Set(record.request.clone()),
        fingerprint: Set(record.fingerprint.clone()),
        response: Set(record.response.clone()),
        outcome: Set(record.outcome.map(|o| o.as_str().to_string())),
        result_summary: Set(record.result_summary.clone()),
        error_code: Set(record.error_code.clone()),
        error_message: Set(record.error_message.clone()),
        normalization: Set(normalization_to_json(record.normalization.as_ref())?),
        started_at: Set(timestamp(&record.started_at)),
        finished_at: Set(record.finished_at.as_ref().map(timestamp)),
    })
}

/// Only the completion columns are set; the rest stay as inserted.
fn completion_to_active_model(completion: &CallCompletion) -> CoreResult<call_record::ActiveModel> {
    Ok(call_record::ActiveModel {
        outcome: Set(Some(completion.outcome.as_str().to_string())),
        response: Set(completion.response.clone()),
        result_summary: Set(completion.result_summary.clone()),
        error_code: Set(completion.error_code.clone()),
        error_message: Set(completion.error_message.clone()),
        normalization: Set(normalization_to_json(completion.normalization.as_ref())?),
        finished_at: Set(Some(timestamp(&completion.finished_at))),
        ..Default::default()
    })
}

#[async_trait]
impl CallLogRepository for SqliteStore {
    async fn insert(&self, record: &CallRecord) -> CoreResult<()> {
        call_record::Entity::insert(record_to_active_model(record)?)
            .exec(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to insert call record: {e}")))?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, completion: &CallCompletion) -> CoreResult<()> {
        let result = call_record::Entity::update_many()
            .set(completion_to_active_model(completion)?)
            .filter(call_record::Column::Id.eq(id.to_string()))
            .filter(call_record::Column::Outcome.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to complete call record: {e}")))?;

        if result.rows_affected == 0 {
            // 区分不存在和已完成
            return Err(match self.find_by_id(id).await? {
                Some(_) => CoreError::StorageError(format!("call record {id} is already completed")),
                None => CoreError::StorageError(format!("call record {id} not found")),
            });
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<CallRecord>> {
        let row = call_record::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to query call record: {e}")))?;

        row.map(call_record::Model::into_record).transpose()
    }

    async fn find_by_service(&self, service_id: &str) -> CoreResult<Vec<CallRecord>> {
        let rows = call_record::Entity::find()
            .filter(call_record::Column::ServiceId.eq(service_id))
            .order_by_asc(call_record::Column::StartedAt)
            .all(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to query call records: {e}")))?;

        rows.into_iter().map(call_record::Model::into_record).collect()
    }

    async fn find_open(&self) -> CoreResult<Vec<CallRecord>> {
        let rows = call_record::Entity::find()
            .filter(call_record::Column::Outcome.is_null())
            .order_by_asc(call_record::Column::StartedAt)
            .all(&self.db)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to query open calls: {e}")))?;

        rows.into_iter().map(call_record::Model::into_record).collect()
    }
}
