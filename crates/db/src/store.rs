//! The registry capability trait and backend selection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::function::{FunctionField, FunctionRecord, FunctionUpdate};
use crate::postgres::PgFunctionStore;
use crate::sqlite::SqliteFunctionStore;

/// Errors from the function registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown registry backend '{0}'. Must be one of: sqlite, postgres")]
    UnknownBackend(String),
}

/// Key-value persistence for function records.
///
/// Callers only ever address records by primary key and read or overwrite
/// whole records; there are no transactions or secondary lookups.
#[async_trait]
pub trait FunctionStore: Send + Sync {
    /// Create the `functions` table if it does not exist.
    async fn migrate(&self) -> Result<(), RegistryError>;

    /// Verify the database is reachable.
    async fn health_check(&self) -> Result<(), RegistryError>;

    /// Insert or update the record for `key`.
    ///
    /// Fields left `None` in `update` keep their stored value. Revives a
    /// logically deleted record. `last_modified_at` never decreases.
    async fn put(&self, key: &str, update: &FunctionUpdate) -> Result<(), RegistryError>;

    /// Fetch a live record, keeping only `fields`.
    async fn get(
        &self,
        key: &str,
        fields: &[FunctionField],
    ) -> Result<Option<FunctionRecord>, RegistryError>;

    /// All live records ordered by key, keeping only `fields`.
    async fn list_all(&self, fields: &[FunctionField]) -> Result<Vec<FunctionRecord>, RegistryError>;

    /// Logically delete `key`. Returns `false` if no live record existed.
    async fn mark_deleted(&self, key: &str) -> Result<bool, RegistryError>;
}

/// Which registry implementation backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryBackend {
    /// Embedded single-node database.
    Sqlite,
    /// Shared database for horizontally scaled control planes.
    Postgres,
}

impl RegistryBackend {
    pub fn from_name(name: &str) -> Result<Self, RegistryError> {
        match name {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "tableStore" => Ok(Self::Postgres),
            other => Err(RegistryError::UnknownBackend(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Connect to the selected backend and ensure the schema exists.
pub async fn connect(
    backend: RegistryBackend,
    database_url: &str,
) -> Result<Arc<dyn FunctionStore>, RegistryError> {
    let store: Arc<dyn FunctionStore> = match backend {
        RegistryBackend::Sqlite => Arc::new(SqliteFunctionStore::connect(database_url).await?),
        RegistryBackend::Postgres => Arc::new(PgFunctionStore::connect(database_url).await?),
    };
    store.migrate().await?;
    tracing::info!(backend = backend.name(), "Function registry ready");
    Ok(store)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
