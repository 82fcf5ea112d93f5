pub mod backend;
pub mod functions;
pub mod generation;
pub mod health;
pub mod models;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /txt2img                                 submit txt2img (POST)
/// /img2img                                 submit img2img (POST)
/// /extra-single-image                      submit post-processing (POST)
///
/// /tasks/{id}                              poll task, optional ?wait=secs
/// /tasks/{id}/progress                     backend progress
/// /tasks/{id}/cancel                       set cancel flag (POST)
///
/// /models                                  list (?type=), register
/// /models/rescan                           reconcile with models dir (POST)
/// /models/{name}                           get, delete (?type=)
/// /models/{name}/load                      load and bind registry (POST)
/// /models/{name}/unload                    unload (POST)
///
/// /backend/sd-models                       local WebUI checkpoints
/// /backend/sd-vae                          local WebUI VAEs
/// /backend/interrupt                       stop the running job (POST)
///
/// /functions                               list function records
/// /functions/{key}                         get, put, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generation::router())
        .nest("/tasks", tasks::router())
        .nest("/models", models::router())
        .nest("/functions", functions::router())
        .nest("/backend", backend::router())
}
