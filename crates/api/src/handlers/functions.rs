//! Handlers for the `/functions` resource: direct access to the function
//! registry for orchestrators that bind endpoints out of band.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sdgate_core::error::CoreError;
use sdgate_db::{FunctionField, FunctionRecord, FunctionUpdate};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_record(state: &AppState, key: &str) -> AppResult<FunctionRecord> {
    state
        .registry
        .get(key, &FunctionField::ALL)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Function",
                id: key.to_string(),
            })
        })
}

/// GET /api/v1/functions
pub async fn list_functions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let records = state.registry.list_all(&FunctionField::ALL).await?;
    Ok(Json(DataResponse { data: records }))
}

/// GET /api/v1/functions/{key}
pub async fn get_function(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let record = find_record(&state, &key).await?;
    Ok(Json(DataResponse { data: record }))
}

/// PUT /api/v1/functions/{key}
///
/// Upsert the given fields; omitted fields keep their stored value.
/// Returns the record as stored.
pub async fn put_function(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(update): Json<FunctionUpdate>,
) -> AppResult<impl IntoResponse> {
    if update == FunctionUpdate::default() {
        return Err(AppError::BadRequest(
            "at least one of sd_model, sd_vae, end_point is required".into(),
        ));
    }
    state.registry.put(&key, &update).await?;
    let record = find_record(&state, &key).await?;
    tracing::info!(function = %key, "Function record updated");
    Ok(Json(DataResponse { data: record }))
}

/// DELETE /api/v1/functions/{key}
///
/// Logical delete. Deleting an absent or already deleted key succeeds.
pub async fn delete_function(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let deleted = state.registry.mark_deleted(&key).await?;
    tracing::info!(function = %key, deleted, "Function record deleted");
    Ok(StatusCode::NO_CONTENT)
}
