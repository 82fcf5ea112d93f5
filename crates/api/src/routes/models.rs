//! Route definitions for the `/models` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::models;
use crate::state::AppState;

/// Routes mounted at `/models`.
///
/// Name routes accept `?type=` to pick one of several same-named models.
///
/// ```text
/// GET    /                -> list_models
/// POST   /                -> register_model
/// POST   /rescan          -> rescan_models
/// GET    /{name}          -> get_model
/// DELETE /{name}          -> delete_model
/// POST   /{name}/load     -> load_model
/// POST   /{name}/unload   -> unload_model
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(models::list_models).post(models::register_model))
        .route("/rescan", post(models::rescan_models))
        .route(
            "/{name}",
            get(models::get_model).delete(models::delete_model),
        )
        .route("/{name}/load", post(models::load_model))
        .route("/{name}/unload", post(models::unload_model))
}
