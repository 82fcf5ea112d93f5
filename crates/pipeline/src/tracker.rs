//! In-memory task tracker.
//!
//! Owns every [`Task`] of this process. All mutations go through one
//! `RwLock` and are validated against [`TaskStatus::can_transition`] under
//! the write guard, so per-task status changes are linearizable and never
//! regress. Each task carries a `watch` channel that waiters subscribe to
//! instead of polling.

use std::collections::HashMap;
use std::time::Duration;

use sdgate_core::task::{CancelFlag, Task, TaskStatus};
use sdgate_core::types::TaskId;
use serde_json::Value;
use tokio::sync::{watch, RwLock};

/// Errors from task tracking.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("not found")]
    NotFound(TaskId),

    #[error("task {0} already exists")]
    Duplicate(TaskId),

    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("timed out waiting for task {0}")]
    Timeout(TaskId),
}

struct Entry {
    task: Task,
    status_tx: watch::Sender<TaskStatus>,
}

impl Entry {
    fn transition(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        let from = self.task.status;
        if !from.can_transition(to) {
            return Err(TaskError::InvalidTransition { from, to });
        }
        let now = chrono::Utc::now();
        self.task.status = to;
        self.task.updated_at = now;
        if to.is_terminal() {
            self.task.finished_at = Some(now);
        }
        self.status_tx.send_replace(to);
        Ok(())
    }
}

#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<TaskId, Entry>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new task in `waiting`.
    pub async fn create(
        &self,
        task_id: TaskId,
        user: &str,
        model: &str,
        version: &str,
    ) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task_id) {
            return Err(TaskError::Duplicate(task_id));
        }
        let task = Task::new(task_id.clone(), user, model, version);
        let (status_tx, _) = watch::channel(task.status);
        tasks.insert(
            task_id,
            Entry {
                task: task.clone(),
                status_tx,
            },
        );
        Ok(task)
    }

    /// Move a task to `status`.
    pub async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        entry.transition(status)?;
        Ok(entry.task.clone())
    }

    /// Move a task to `status` and record its terminal message and result.
    pub async fn complete(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
        result: Option<Value>,
    ) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        entry.transition(status)?;
        entry.task.message = message;
        entry.task.result = result;
        Ok(entry.task.clone())
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, TaskError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// Set the cancel flag. The flag is never cleared and does not change status.
    pub async fn cancel(&self, task_id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        entry.task.cancel = CancelFlag::Set;
        entry.task.updated_at = chrono::Utc::now();
        Ok(entry.task.clone())
    }

    /// Block until the task is terminal or `timeout` elapses.
    pub async fn wait_terminal(&self, task_id: &str, timeout: Duration) -> Result<Task, TaskError> {
        let mut rx = {
            let tasks = self.tasks.read().await;
            tasks
                .get(task_id)
                .map(|entry| entry.status_tx.subscribe())
                .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?
        };

        let reached = tokio::time::timeout(timeout, async {
            rx.wait_for(|status| status.is_terminal()).await.is_ok()
        })
        .await
        .map_err(|_| TaskError::Timeout(task_id.to_string()))?;

        if !reached {
            // Sender dropped: evicted while waiting.
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        self.get(task_id).await
    }

    /// Drop tasks that have been terminal for longer than `ttl`.
    /// Returns how many were evicted.
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let now = chrono::Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, entry| match entry.task.finished_at {
            Some(finished) => (now - finished)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true),
            None => true,
        });
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
