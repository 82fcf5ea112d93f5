//! Route definitions for generation submission.

use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at the `/api/v1` root.
///
/// ```text
/// POST   /txt2img              -> txt2img
/// POST   /img2img              -> img2img
/// POST   /extra-single-image   -> extra_single_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/txt2img", post(generation::txt2img))
        .route("/img2img", post(generation::img2img))
        .route("/extra-single-image", post(generation::extra_single_image))
}
