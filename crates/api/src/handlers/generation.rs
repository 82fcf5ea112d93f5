//! Handlers for generation submission.
//!
//! The body is forwarded to the backend as an opaque JSON document; only
//! `stable_diffusion_model` is inspected. `X-Fc-Invocation-Type: Async`
//! returns 202 with the new task, otherwise the call blocks until the task
//! is terminal and returns 200 with the finished task.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sdgate_pipeline::proxy::ASYNC_INVOCATION_HEADER;
use sdgate_pipeline::{GenerationKind, GenerationRequest, InvocationMode, SubmitOutcome};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequestUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response header carrying the id of the created task.
pub const TASK_ID_HEADER: &str = "taskid";

/// Response header carrying the requested model.
pub const MODEL_HEADER: &str = "model";

/// POST /api/v1/txt2img
pub async fn txt2img(
    user: RequestUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    submit(GenerationKind::Txt2Img, user, &state, &headers, &body).await
}

/// POST /api/v1/img2img
pub async fn img2img(
    user: RequestUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    submit(GenerationKind::Img2Img, user, &state, &headers, &body).await
}

/// POST /api/v1/extra-single-image
pub async fn extra_single_image(
    user: RequestUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    submit(GenerationKind::ExtraSingleImage, user, &state, &headers, &body).await
}

async fn submit(
    kind: GenerationKind,
    user: RequestUser,
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<impl IntoResponse> {
    let body: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, path = kind.path(), "Unparseable generation body");
        AppError::BadRequest("bad request body".into())
    })?;

    let mode = InvocationMode::from_header(
        headers
            .get(ASYNC_INVOCATION_HEADER)
            .and_then(|v| v.to_str().ok()),
    );

    let outcome = state
        .pipeline
        .submit(GenerationRequest {
            kind,
            user: user.name,
            body,
            mode,
        })
        .await?;

    let status = match outcome {
        SubmitOutcome::Accepted(_) => StatusCode::ACCEPTED,
        SubmitOutcome::Completed(_) => StatusCode::OK,
    };
    let task = match outcome {
        SubmitOutcome::Accepted(task) | SubmitOutcome::Completed(task) => task,
    };

    let mut response_headers = HeaderMap::new();
    insert_header(&mut response_headers, TASK_ID_HEADER, &task.task_id);
    insert_header(&mut response_headers, MODEL_HEADER, &task.model);

    Ok((status, response_headers, Json(DataResponse { data: task })))
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => tracing::warn!(header = name, "Value not representable as a header"),
    }
}
