//! Handlers for the `/tasks` resource.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use sdgate_core::task::HTTP_TIMEOUT;
use sdgate_pipeline::{PipelineError, TaskError};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /tasks/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    /// Seconds to wait for the task to become terminal before answering.
    pub wait: Option<u64>,
}

/// GET /api/v1/tasks/{id}
///
/// Returns the task immediately, or with `?wait=secs` once it is terminal
/// or the wait (capped at the sync timeout) elapses, whichever is first.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TaskQuery>,
) -> AppResult<impl IntoResponse> {
    let task = match query.wait.filter(|secs| *secs > 0) {
        None => state.pipeline.task(&id).await?,
        Some(secs) => {
            let wait = Duration::from_secs(secs).min(HTTP_TIMEOUT);
            match state.pipeline.wait(&id, wait).await {
                Ok(task) => task,
                Err(PipelineError::Task(TaskError::Timeout(_))) => state.pipeline.task(&id).await?,
                Err(e) => return Err(e.into()),
            }
        }
    };
    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/tasks/{id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let progress = state.pipeline.progress(&id).await?;
    Ok(Json(DataResponse { data: progress }))
}

/// POST /api/v1/tasks/{id}/cancel
///
/// Sets the advisory cancel flag. A task that has not been dispatched yet
/// fails instead of reaching the backend; an in-flight call is not aborted.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = state.pipeline.cancel(&id).await?;
    Ok(Json(DataResponse { data: task }))
}
