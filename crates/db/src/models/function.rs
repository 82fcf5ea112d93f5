//! Function record model.

use serde::{Deserialize, Serialize};
use sdgate_core::types::{timestamp_from_millis, Timestamp};
use sqlx::FromRow;

/// Column list for `functions` queries.
pub(crate) const COLUMNS: &str =
    "primary_key, sd_model, sd_vae, end_point, created_at, last_modified_at";

/// Selectable non-key fields of a function record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionField {
    SdModel,
    SdVae,
    EndPoint,
    CreateTime,
    LastModifyTime,
}

impl FunctionField {
    pub const ALL: [FunctionField; 5] = [
        Self::SdModel,
        Self::SdVae,
        Self::EndPoint,
        Self::CreateTime,
        Self::LastModifyTime,
    ];
}

/// A function record as returned by the registry.
///
/// Fields not requested in a `get`/`list_all` projection are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd_vae: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<Timestamp>,
}

impl FunctionRecord {
    /// Keep only the requested fields.
    pub fn project(self, fields: &[FunctionField]) -> Self {
        let keep = |field: FunctionField| fields.contains(&field);
        Self {
            key: self.key,
            sd_model: self.sd_model.filter(|_| keep(FunctionField::SdModel)),
            sd_vae: self.sd_vae.filter(|_| keep(FunctionField::SdVae)),
            end_point: self.end_point.filter(|_| keep(FunctionField::EndPoint)),
            created_at: self.created_at.filter(|_| keep(FunctionField::CreateTime)),
            last_modified_at: self
                .last_modified_at
                .filter(|_| keep(FunctionField::LastModifyTime)),
        }
    }

    /// The endpoint, if bound and non-empty.
    pub fn live_endpoint(&self) -> Option<&str> {
        self.end_point.as_deref().filter(|e| !e.is_empty())
    }
}

/// Partial update for `put`. `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionUpdate {
    pub sd_model: Option<String>,
    pub sd_vae: Option<String>,
    pub end_point: Option<String>,
}

impl FunctionUpdate {
    pub fn sd_model(mut self, model: impl Into<String>) -> Self {
        self.sd_model = Some(model.into());
        self
    }

    pub fn sd_vae(mut self, vae: impl Into<String>) -> Self {
        self.sd_vae = Some(vae.into());
        self
    }

    pub fn end_point(mut self, endpoint: impl Into<String>) -> Self {
        self.end_point = Some(endpoint.into());
        self
    }
}

/// Raw `functions` row. Timestamps are epoch milliseconds.
#[derive(Debug, FromRow)]
pub(crate) struct FunctionRow {
    pub primary_key: String,
    pub sd_model: Option<String>,
    pub sd_vae: Option<String>,
    pub end_point: Option<String>,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl From<FunctionRow> for FunctionRecord {
    fn from(row: FunctionRow) -> Self {
        Self {
            key: row.primary_key,
            sd_model: row.sd_model,
            sd_vae: row.sd_vae,
            end_point: row.end_point,
            created_at: Some(timestamp_from_millis(row.created_at)),
            last_modified_at: Some(timestamp_from_millis(row.last_modified_at)),
        }
    }
}
