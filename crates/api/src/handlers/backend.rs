//! Handlers for the `/backend` resource: the local WebUI's own inventory
//! and job control.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/backend/sd-models
pub async fn list_sd_models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let models = state.backend.sd_models(&state.config.downstream).await?;
    Ok(Json(DataResponse { data: models }))
}

/// GET /api/v1/backend/sd-vae
pub async fn list_sd_vae(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let vaes = state.backend.sd_vaes(&state.config.downstream).await?;
    Ok(Json(DataResponse { data: vaes }))
}

/// POST /api/v1/backend/interrupt
///
/// Stop whatever the local backend is generating. Task records are not
/// changed here.
pub async fn interrupt(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.backend.interrupt(&state.config.downstream).await?;
    Ok(StatusCode::NO_CONTENT)
}
