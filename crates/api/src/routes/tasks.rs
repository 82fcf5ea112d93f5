//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /{id}            -> get_task
/// GET    /{id}/progress   -> get_progress
/// POST   /{id}/cancel     -> cancel_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/progress", get(tasks::get_progress))
        .route("/{id}/cancel", post(tasks::cancel_task))
}
