use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sdgate_core::error::CoreError;
use sdgate_db::RegistryError;
use sdgate_pipeline::dispatcher::NO_ENDPOINT_MESSAGE;
use sdgate_pipeline::{BackendError, DispatchError, ModelError, PipelineError, TaskError};
use serde_json::json;

const INTERNAL_MESSAGE: &str = "an internal error";

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of each crate and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce `{ "error", "code" }` bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        Self::Pipeline(PipelineError::Dispatch(err))
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        Self::Pipeline(PipelineError::Backend(err))
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        Self::Pipeline(PipelineError::Task(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(err) => classify_pipeline_error(err),
            AppError::Model(err) => classify_model_error(err),
            AppError::Registry(err) => internal("Registry error", err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal("Internal error", msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(
    context: &'static str,
    err: &dyn std::fmt::Display,
) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        INTERNAL_MESSAGE.to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Internal(msg) => internal("Internal core error", msg),
    }
}

fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::InvalidRequest(reason) => {
            tracing::debug!(reason = %reason, "Rejected generation request");
            (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "bad request body".to_string(),
            )
        }
        PipelineError::Dispatch(DispatchError::NoEndpoint(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "NO_ENDPOINT",
            NO_ENDPOINT_MESSAGE.to_string(),
        ),
        PipelineError::Dispatch(DispatchError::Registry(e)) => internal("Registry error", e),
        PipelineError::Backend(BackendError::Timeout) | PipelineError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            err.to_string(),
        ),
        PipelineError::Backend(BackendError::Failed(msg)) => {
            (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", msg.clone())
        }
        PipelineError::Task(task) => match task {
            TaskError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", "not found".to_string()),
            TaskError::Duplicate(_) | TaskError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "CONFLICT", task.to_string())
            }
            TaskError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", task.to_string()),
        },
        PipelineError::Cancelled(_) => (StatusCode::CONFLICT, "CANCELLED", err.to_string()),
        PipelineError::Internal(msg) => internal("Pipeline error", msg),
    }
}

fn classify_model_error(err: &ModelError) -> (StatusCode, &'static str, String) {
    match err {
        ModelError::NotFound(_) | ModelError::FileMissing(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        ModelError::InvalidName(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
        ModelError::AlreadyExists(_)
        | ModelError::Ambiguous(_)
        | ModelError::AlreadyLoading(_)
        | ModelError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        ModelError::LoadFailed { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "ENDPOINT_NOT_READY",
            err.to_string(),
        ),
        ModelError::DeleteFailed { name, reason } => {
            tracing::error!(model = %name, error = %reason, "Model file delete failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DELETE_FAILED",
                format!("delete model fail: {name}"),
            )
        }
        ModelError::Io(e) => internal("Model directory error", e),
    }
}
