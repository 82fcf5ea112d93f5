//! Route definitions for the `/backend` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::backend;
use crate::state::AppState;

/// Routes mounted at `/backend`.
///
/// ```text
/// GET    /sd-models       -> list_sd_models
/// GET    /sd-vae          -> list_sd_vae
/// POST   /interrupt       -> interrupt
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sd-models", get(backend::list_sd_models))
        .route("/sd-vae", get(backend::list_sd_vae))
        .route("/interrupt", post(backend::interrupt))
}
