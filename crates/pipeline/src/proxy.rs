//! Per-request generation pipeline.
//!
//! `submit` creates a task and spawns its run: resolve endpoint, offload
//! the request payload, call the backend, restore the response and record
//! the terminal status. Synchronous callers wait for the run up to the sync
//! timeout; the run itself is never aborted and still records its outcome
//! after the caller gives up.

use std::sync::Arc;
use std::time::Duration;

use sdgate_core::offload::OffloadCodec;
use sdgate_core::task::{generate_task_id, Task, TaskStatus, HTTP_TIMEOUT};
use sdgate_core::types::TaskId;
use sdgate_sdapi::messages::ProgressResult;
use serde_json::Value;

use crate::backend::{BackendError, GenerationBackend, GenerationKind};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::tracker::{TaskError, TaskTracker};

/// Request header selecting asynchronous invocation.
pub const ASYNC_INVOCATION_HEADER: &str = "X-Fc-Invocation-Type";

/// Body field naming the model a generation request targets.
pub const MODEL_FIELD: &str = "stable_diffusion_model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Respond with the backend result once the task is terminal.
    Sync,
    /// Respond immediately with the new task; clients poll for the result.
    Async,
}

impl InvocationMode {
    /// Mode selected by the value of [`ASYNC_INVOCATION_HEADER`].
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("async") => Self::Async,
            _ => Self::Sync,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub user: String,
    pub body: Value,
    pub mode: InvocationMode,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Sync mode: the task has succeeded and carries the backend result.
    Completed(Task),
    /// Async mode: the task was created and is running in the background.
    Accepted(Task),
}

impl SubmitOutcome {
    pub fn task(&self) -> &Task {
        match self {
            Self::Completed(task) | Self::Accepted(task) => task,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("bad request body: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("task {0} was cancelled before dispatch")]
    Cancelled(TaskId),

    /// The sync wait elapsed. The task keeps running.
    #[error("timed out waiting for task {0}")]
    Timeout(TaskId),

    #[error("an internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct ProxyPipeline {
    tracker: Arc<TaskTracker>,
    dispatcher: Arc<Dispatcher>,
    backend: Arc<dyn GenerationBackend>,
    codec: OffloadCodec,
    sync_timeout: Duration,
}

impl ProxyPipeline {
    pub fn new(
        tracker: Arc<TaskTracker>,
        dispatcher: Arc<Dispatcher>,
        backend: Arc<dyn GenerationBackend>,
        codec: OffloadCodec,
    ) -> Self {
        Self {
            tracker,
            dispatcher,
            backend,
            codec,
            sync_timeout: HTTP_TIMEOUT,
        }
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Create a task for `request` and run it.
    pub async fn submit(&self, request: GenerationRequest) -> Result<SubmitOutcome, PipelineError> {
        let model = model_of(&request.body)?;
        let task_id = generate_task_id();
        let task = self
            .tracker
            .create(task_id.clone(), &request.user, &model, request.kind.path())
            .await?;
        tracing::info!(
            task_id = %task_id,
            user = %request.user,
            model = %model,
            path = request.kind.path(),
            "Generation task submitted",
        );

        let mode = request.mode;
        let this = self.clone();
        let run_id = task_id.clone();
        let handle = tokio::spawn(async move {
            let GenerationRequest { kind, user, body, .. } = request;
            this.run(&run_id, &model, kind, &user, body).await
        });

        match mode {
            InvocationMode::Async => Ok(SubmitOutcome::Accepted(task)),
            InvocationMode::Sync => match tokio::time::timeout(self.sync_timeout, handle).await {
                Ok(Ok(Ok(task))) => Ok(SubmitOutcome::Completed(task)),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(join)) => Err(PipelineError::Internal(join.to_string())),
                Err(_) => {
                    tracing::warn!(task_id = %task_id, "Sync wait timed out, task continues");
                    Err(PipelineError::Timeout(task_id))
                }
            },
        }
    }

    async fn run(
        &self,
        task_id: &str,
        model: &str,
        kind: GenerationKind,
        user: &str,
        body: Value,
    ) -> Result<Task, PipelineError> {
        let endpoint = match self.dispatcher.resolve(model).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.fail(task_id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        if self.tracker.get(task_id).await?.cancel.is_set() {
            self.fail(task_id, "task cancelled").await;
            return Err(PipelineError::Cancelled(task_id.to_string()));
        }

        self.tracker.update_status(task_id, TaskStatus::Running).await?;
        let body = self.codec.inbound(body, task_id, user).await;

        match self.backend.generate(&endpoint.url, kind, &body).await {
            Ok(reply) => {
                let reply = self.codec.outbound(reply).await;
                let task = self
                    .tracker
                    .complete(task_id, TaskStatus::Succeeded, None, Some(reply))
                    .await?;
                tracing::info!(task_id, endpoint = %endpoint.url, "Generation task succeeded");
                Ok(task)
            }
            Err(e) => {
                self.fail(task_id, &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    async fn fail(&self, task_id: &str, message: &str) {
        tracing::warn!(task_id, error = %message, "Generation task failed");
        if let Err(e) = self
            .tracker
            .complete(task_id, TaskStatus::Failed, Some(message.to_string()), None)
            .await
        {
            tracing::error!(task_id, error = %e, "Failed to record task failure");
        }
    }

    pub async fn task(&self, task_id: &str) -> Result<Task, PipelineError> {
        Ok(self.tracker.get(task_id).await?)
    }

    /// Long-poll a task until it is terminal or `timeout` elapses.
    pub async fn wait(&self, task_id: &str, timeout: Duration) -> Result<Task, PipelineError> {
        Ok(self.tracker.wait_terminal(task_id, timeout).await?)
    }

    pub async fn cancel(&self, task_id: &str) -> Result<Task, PipelineError> {
        let task = self.tracker.cancel(task_id).await?;
        tracing::info!(task_id, status = %task.status, "Task cancel flag set");
        Ok(task)
    }

    /// Backend progress for the endpoint currently serving a task's model.
    pub async fn progress(&self, task_id: &str) -> Result<ProgressResult, PipelineError> {
        let task = self.tracker.get(task_id).await?;
        let endpoint = self.dispatcher.resolve(&task.model).await?;
        Ok(self.backend.progress(&endpoint.url).await?)
    }
}

/// The non-empty model name a generation body targets.
pub fn model_of(body: &Value) -> Result<String, PipelineError> {
    if !body.is_object() {
        return Err(PipelineError::InvalidRequest(
            "body must be a JSON object".into(),
        ));
    }
    match body.get(MODEL_FIELD).and_then(Value::as_str) {
        Some(model) if !model.is_empty() => Ok(model.to_string()),
        _ => Err(PipelineError::InvalidRequest(format!(
            "missing {MODEL_FIELD}"
        ))),
    }
}
