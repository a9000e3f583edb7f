use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::engine::EngineAdapter;
use crate::model::{OptimizationRequest, OptimizationResult};
use crate::runtime::storage::TaskStore;
use crate::runtime::types::{TaskFailure, TaskId, TaskState};

/// How often a task may re-invoke the engine after a retryable failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.  `0` disables retries.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Drives one task from `RUNNING` to exactly one terminal state.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    store: TaskStore,
    adapter: EngineAdapter,
    retry: RetryPolicy,
}

impl TaskRunner {
    pub fn new(store: TaskStore, adapter: EngineAdapter, retry: RetryPolicy) -> Self {
        Self {
            store,
            adapter,
            retry,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Execute the task and record its outcome.
    ///
    /// Never returns an error and never unwinds: engine failures, validation
    /// failures and panics all end up as a `FAILED` record.
    pub async fn run(&self, task_id: TaskId, request: Arc<OptimizationRequest>) {
        let span = info_span!("task", %task_id);
        async move {
            let outcome = AssertUnwindSafe(self.attempt(task_id, &request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(TaskFailure::internal(format!(
                        "runner panicked: {}",
                        panic_message(&*panic)
                    )))
                });
            self.record(task_id, outcome).await;
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        task_id: TaskId,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, TaskFailure> {
        loop {
            let attempt = self
                .store
                .record_attempt(task_id)
                .await
                .map_err(|e| TaskFailure::internal(e.to_string()))?;
            debug!(attempt, "invoking engine");

            match self.adapter.invoke(request).await {
                Ok(result) => return Ok(result),
                Err(failure)
                    if failure.kind.is_retryable() && attempt <= self.retry.max_retries =>
                {
                    warn!(attempt, error = %failure, "engine attempt failed, retrying");
                    if !self.retry.backoff.is_zero() {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    async fn record(&self, task_id: TaskId, outcome: Result<OptimizationResult, TaskFailure>) {
        let (attempted, written) = match outcome {
            Ok(result) => {
                info!(
                    ddl = result.ddl.len(),
                    migrations = result.migrations.len(),
                    queries = result.queries.len(),
                    "task done"
                );
                (TaskState::Done, self.store.complete(task_id, result).await)
            }
            Err(failure) => {
                warn!(kind = %failure.kind, error = %failure.message, "task failed");
                (TaskState::Failed, self.store.fail(task_id, failure).await)
            }
        };
        if let Err(e) = written {
            error!(error = %e, %attempted, "terminal write rejected");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
