//! Embedded SQLite registry for a single always-on control instance.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::models::function::{FunctionField, FunctionRecord, FunctionRow, FunctionUpdate, COLUMNS};
use crate::store::{now_millis, FunctionStore, RegistryError};

const CREATE_TABLE: &str = "\
    CREATE TABLE IF NOT EXISTS functions ( \
        primary_key      TEXT PRIMARY KEY NOT NULL, \
        sd_model         TEXT, \
        sd_vae           TEXT, \
        end_point        TEXT, \
        created_at       INTEGER NOT NULL, \
        last_modified_at INTEGER NOT NULL, \
        deleted_at       INTEGER \
    )";

const UPSERT: &str = "\
    INSERT INTO functions \
        (primary_key, sd_model, sd_vae, end_point, created_at, last_modified_at, deleted_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?5, NULL) \
    ON CONFLICT (primary_key) DO UPDATE SET \
        sd_model = COALESCE(excluded.sd_model, functions.sd_model), \
        sd_vae = COALESCE(excluded.sd_vae, functions.sd_vae), \
        end_point = COALESCE(excluded.end_point, functions.end_point), \
        last_modified_at = MAX(functions.last_modified_at, excluded.last_modified_at), \
        deleted_at = NULL";

pub struct SqliteFunctionStore {
    pool: SqlitePool,
}

impl SqliteFunctionStore {
    /// Open (creating if missing) the database at `database_url`,
    /// e.g. `sqlite://sdgate.db` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = pool_options().connect_with(options).await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// One connection that is never recycled: SQLite has a single writer, and an
/// in-memory database exists only inside the connection that created it.
fn pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

#[async_trait]
impl FunctionStore for SqliteFunctionStore {
    async fn migrate(&self) -> Result<(), RegistryError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn put(&self, key: &str, update: &FunctionUpdate) -> Result<(), RegistryError> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(update.sd_model.as_deref())
            .bind(update.sd_vae.as_deref())
            .bind(update.end_point.as_deref())
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        fields: &[FunctionField],
    ) -> Result<Option<FunctionRecord>, RegistryError> {
        let query = format!(
            "SELECT {COLUMNS} FROM functions WHERE primary_key = ?1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, FunctionRow>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| FunctionRecord::from(r).project(fields)))
    }

    async fn list_all(&self, fields: &[FunctionField]) -> Result<Vec<FunctionRecord>, RegistryError> {
        let query = format!(
            "SELECT {COLUMNS} FROM functions WHERE deleted_at IS NULL ORDER BY primary_key ASC"
        );
        let rows = sqlx::query_as::<_, FunctionRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| FunctionRecord::from(r).project(fields))
            .collect())
    }

    async fn mark_deleted(&self, key: &str) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "UPDATE functions \
             SET deleted_at = ?2, last_modified_at = MAX(last_modified_at, ?2) \
             WHERE primary_key = ?1 AND deleted_at IS NULL",
        )
        .bind(key)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
