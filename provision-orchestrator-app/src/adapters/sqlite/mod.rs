//! SQLite-based store using `SeaORM`.
//!
//! A single `SqliteStore` implements `ServiceRepository` and `CallLogRepository`,
//! backed by a local `SQLite` database.

mod call_log_repo;
pub(crate) mod entity;
mod migration;
mod service_repo;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use provision_orchestrator_core::error::{CoreError, CoreResult};
use provision_orchestrator_core::utils::datetime;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use migration::Migrator;

/// SQLite-based store for the `provisiond` daemon and embedding hosts.
pub struct SqliteStore {
    /// Shared `SeaORM` database connection.
    pub(crate) db: DatabaseConnection,
}

impl SqliteStore {
    /// Create a new `SQLite` store.
    ///
    /// `db_path` is created if it does not exist; the schema is migrated before the store
    /// is returned.
    ///
    /// # Errors
    /// Returns `CoreError::StorageError` if directory creation, database
    /// connection, or schema migration fails.
    pub async fn new(db_path: &Path) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::StorageError(format!("Failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let db = Database::connect(&db_url)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to connect to SQLite: {e}")))?;

        let store = Self { db };

        // Ensure schema is up to date before the store is used.
        Migrator::up(&store.db, None)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to run migrations: {e}")))?;

        Ok(store)
    }
}

/// Fixed-width RFC 3339, so text order is time order.
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(field: &str, raw: &str) -> CoreResult<DateTime<Utc>> {
    datetime::parse(raw)
        .ok_or_else(|| CoreError::SerializationError(format!("Invalid {field}: {raw}")))
}
