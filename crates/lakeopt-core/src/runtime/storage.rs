use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::model::{OptimizationRequest, OptimizationResult};
use crate::runtime::types::{RuntimeError, TaskFailure, TaskId, TaskState, TaskStatus};

/// The complete in-memory record for a single submitted task.
#[derive(Debug)]
struct TaskRecord {
    status: TaskStatus,
    request: Arc<OptimizationRequest>,
    /// Engine invocations made so far (retries included).
    attempts: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A consistent, read-only snapshot of a task returned to callers.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub request: Arc<OptimizationRequest>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskView {
    pub fn state(&self) -> TaskState {
        self.status.state()
    }

    fn from_record(task_id: TaskId, record: &TaskRecord) -> Self {
        Self {
            task_id,
            status: record.status.clone(),
            request: Arc::clone(&record.request),
            attempts: record.attempts,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Centralized, thread-safe task storage.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so many readers can observe task
/// status concurrently while each task's runner writes its terminal state.
/// Every mutation happens under a single write-lock acquisition, so readers
/// never see a half-written record.
///
/// Nothing is persisted: the store lives as long as the process that built it.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
}

impl TaskStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh `TaskId` and insert a `RUNNING` record.
    pub async fn create(&self, request: Arc<OptimizationRequest>) -> TaskId {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        loop {
            let task_id = TaskId::generate();
            if let Entry::Vacant(slot) = guard.entry(task_id) {
                slot.insert(TaskRecord {
                    status: TaskStatus::Running,
                    request,
                    attempts: 0,
                    created_at: now,
                    updated_at: now,
                });
                return task_id;
            }
        }
    }

    /// Return a snapshot of the task.
    pub async fn get(&self, task_id: TaskId) -> Result<TaskView, RuntimeError> {
        let guard = self.inner.read().await;
        guard
            .get(&task_id)
            .map(|record| TaskView::from_record(task_id, record))
            .ok_or(RuntimeError::TaskNotFound { task_id })
    }

    /// Transition a `RUNNING` task to `DONE`.
    pub async fn complete(
        &self,
        task_id: TaskId,
        result: OptimizationResult,
    ) -> Result<(), RuntimeError> {
        self.finish(
            task_id,
            TaskStatus::Done {
                result: Arc::new(result),
            },
        )
        .await
    }

    /// Transition a `RUNNING` task to `FAILED`.
    pub async fn fail(&self, task_id: TaskId, error: TaskFailure) -> Result<(), RuntimeError> {
        self.finish(task_id, TaskStatus::Failed { error }).await
    }

    /// Bump the attempt counter of a `RUNNING` task and return the new count.
    pub async fn record_attempt(&self, task_id: TaskId) -> Result<u32, RuntimeError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(&task_id)
            .ok_or(RuntimeError::TaskNotFound { task_id })?;
        if record.status.is_terminal() {
            return Err(RuntimeError::InvalidTransition {
                task_id,
                from: record.status.state(),
            });
        }
        record.attempts += 1;
        Ok(record.attempts)
    }

    /// Snapshot of every task, newest first.
    pub async fn list(&self) -> Vec<TaskView> {
        let guard = self.inner.read().await;
        let mut views: Vec<TaskView> = guard
            .iter()
            .map(|(task_id, record)| TaskView::from_record(*task_id, record))
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        views
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    async fn finish(&self, task_id: TaskId, status: TaskStatus) -> Result<(), RuntimeError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(&task_id)
            .ok_or(RuntimeError::TaskNotFound { task_id })?;
        if record.status.is_terminal() {
            return Err(RuntimeError::InvalidTransition {
                task_id,
                from: record.status.state(),
            });
        }
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }
}
