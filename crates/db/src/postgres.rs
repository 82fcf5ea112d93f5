//! PostgreSQL registry shared by several control-plane instances.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::function::{FunctionField, FunctionRecord, FunctionRow, FunctionUpdate, COLUMNS};
use crate::store::{now_millis, FunctionStore, RegistryError};

const CREATE_TABLE: &str = "\
    CREATE TABLE IF NOT EXISTS functions ( \
        primary_key      TEXT PRIMARY KEY, \
        sd_model         TEXT, \
        sd_vae           TEXT, \
        end_point        TEXT, \
        created_at       BIGINT NOT NULL, \
        last_modified_at BIGINT NOT NULL, \
        deleted_at       BIGINT \
    )";

const UPSERT: &str = "\
    INSERT INTO functions \
        (primary_key, sd_model, sd_vae, end_point, created_at, last_modified_at, deleted_at) \
    VALUES ($1, $2, $3, $4, $5, $5, NULL) \
    ON CONFLICT (primary_key) DO UPDATE SET \
        sd_model = COALESCE(EXCLUDED.sd_model, functions.sd_model), \
        sd_vae = COALESCE(EXCLUDED.sd_vae, functions.sd_vae), \
        end_point = COALESCE(EXCLUDED.end_point, functions.end_point), \
        last_modified_at = GREATEST(functions.last_modified_at, EXCLUDED.last_modified_at), \
        deleted_at = NULL";

pub struct PgFunctionStore {
    pool: PgPool,
}

impl PgFunctionStore {
    pub async fn connect(database_url: &str) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FunctionStore for PgFunctionStore {
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
            "SELECT {COLUMNS} FROM functions WHERE primary_key = $1 AND deleted_at IS NULL"
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
             SET deleted_at = $2, last_modified_at = GREATEST(last_modified_at, $2) \
             WHERE primary_key = $1 AND deleted_at IS NULL",
        )
        .bind(key)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
