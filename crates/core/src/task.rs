//! Generation task lifecycle.
//!
//! A task is created `waiting` when a request is accepted, moves to
//! `running` once it has been dispatched to a backend, and ends in
//! `succeeded` or `failed`. A task that never reached a backend (no
//! endpoint, offload aborted) goes straight from `waiting` to `failed`.
//! Terminal states accept no further transitions.

use std::fmt;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

use crate::types::{TaskId, Timestamp};

/// Length of generated task identifiers.
pub const TASK_ID_LENGTH: usize = 10;

/// How long a synchronous caller waits for a task to reach a terminal state.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Generate a random alphanumeric task identifier of [`TASK_ID_LENGTH`] chars.
pub fn generate_task_id() -> TaskId {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TASK_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Statuses reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        match self {
            Self::Waiting => &[Self::Running, Self::Failed],
            Self::Running => &[Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed => &[],
        }
    }

    pub fn can_transition(self, to: TaskStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory cancellation marker. Serialized as `0` (unset) or `1` (set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelFlag {
    #[default]
    Unset = 0,
    Set = 1,
}

impl CancelFlag {
    pub fn is_set(self) -> bool {
        self == Self::Set
    }
}

impl Serialize for CancelFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// One tracked client generation request.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub task_id: TaskId,
    pub user: String,
    pub status: TaskStatus,
    pub model: String,
    /// Backend API path the task was submitted to (e.g. `/sdapi/v1/txt2img`).
    pub version: String,
    pub cancel: CancelFlag,
    /// Terminal message: backend or dispatch error text for failed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Backend response document after outbound rewriting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl Task {
    pub fn new(task_id: TaskId, user: &str, model: &str, version: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            task_id,
            user: user.to_string(),
            status: TaskStatus::Waiting,
            model: model.to_string(),
            version: version.to_string(),
            cancel: CancelFlag::Unset,
            message: None,
            result: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}
