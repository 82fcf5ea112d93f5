//! Route definitions for the `/functions` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::functions;
use crate::state::AppState;

/// Routes mounted at `/functions`.
///
/// ```text
/// GET    /           -> list_functions
/// GET    /{key}      -> get_function
/// PUT    /{key}      -> put_function
/// DELETE /{key}      -> delete_function
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(functions::list_functions)).route(
        "/{key}",
        get(functions::get_function)
            .put(functions::put_function)
            .delete(functions::delete_function),
    )
}
