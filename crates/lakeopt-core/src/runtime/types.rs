use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::OptimizationResult;

/// Unique identifier for a submitted optimization task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Allocate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Externally visible lifecycle state.  This is what `/status` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
            TaskState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state together with its payload.
///
/// Holding the result / error inside the variant makes "`DONE` with an error"
/// or "`RUNNING` with a result" unrepresentable.
#[derive(Debug, Clone)]
pub enum TaskStatus {
    /// Accepted and queued or executing.
    Running,
    /// Finished with a validated proposal.
    Done { result: Arc<OptimizationResult> },
    /// Finished without a proposal.
    Failed { error: TaskFailure },
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        match self {
            TaskStatus::Running => TaskState::Running,
            TaskStatus::Done { .. } => TaskState::Done,
            TaskStatus::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Classification of a stored task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The engine answered but its proposal broke a structural rule.
    ValidationError,
    /// The engine was reached but returned an error or unusable content.
    EngineError,
    /// The engine could not be reached or did not answer in time.
    EngineUnavailable,
    /// The runner itself faulted.
    InternalError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ValidationError => "ValidationError",
            FailureKind::EngineError => "EngineError",
            FailureKind::EngineUnavailable => "EngineUnavailable",
            FailureKind::InternalError => "InternalError",
        }
    }

    /// Whether the runner may re-invoke the engine after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::EngineError | FailureKind::EngineUnavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error stored on a `FAILED` task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ValidationError, message)
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(FailureKind::EngineError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::EngineUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InternalError, message)
    }
}

/// Errors produced by the job runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The referenced task does not exist.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    /// The task is still `RUNNING`.
    #[error("task {task_id} is not ready")]
    NotReady { task_id: TaskId },

    /// The task ended `FAILED`; carries the stored error.
    #[error("task {task_id} failed: {failure}")]
    TaskFailed { task_id: TaskId, failure: TaskFailure },

    /// A terminal write was attempted on a task that is already terminal.
    #[error("invalid transition for task {task_id}: already {from}")]
    InvalidTransition { task_id: TaskId, from: TaskState },

    /// The job queue is at capacity; nothing was created.
    #[error("job queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The request was rejected before a task was created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The worker pool is gone.
    #[error("job manager shut down")]
    Shutdown,
}
