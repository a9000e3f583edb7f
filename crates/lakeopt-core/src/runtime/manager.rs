use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::engine::validate::validate_request;
use crate::model::{OptimizationRequest, OptimizationResult};
use crate::runtime::runner::TaskRunner;
use crate::runtime::storage::{TaskStore, TaskView};
use crate::runtime::types::{RuntimeError, TaskId, TaskState, TaskStatus};

/// Sizing of the job queue and worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Accepted tasks that may wait for a worker.  Submissions beyond this
    /// fail with [`RuntimeError::QueueFull`].
    pub queue_capacity: usize,
    /// Tasks executed concurrently.
    pub workers: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 4,
        }
    }
}

/// A unit of work handed from `submit` to the worker pool.
#[derive(Debug)]
struct Job {
    task_id: TaskId,
    request: Arc<OptimizationRequest>,
}

/// Entry point for task submission and lookup.
///
/// Submissions go through a bounded `mpsc` queue drained by a fixed pool of
/// workers, so a burst of requests can never spawn unbounded work.  Lookups
/// read straight from the shared [`TaskStore`].
///
/// ```rust,ignore
/// let manager = JobManager::start(runner, ManagerConfig::default());
/// let task_id = manager.submit(request).await?;
/// let state = manager.status(task_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct JobManager {
    store: TaskStore,
    queue: mpsc::Sender<Job>,
    capacity: usize,
    workers: usize,
}

impl JobManager {
    /// Spawn the worker pool and return a handle.
    ///
    /// Must be called from within a tokio runtime.  Workers stop once every
    /// handle has been dropped and the queue is drained.
    pub fn start(runner: TaskRunner, config: ManagerConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let store = runner.store().clone();

        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let runner = runner.clone();
            tokio::spawn(async move {
                Self::worker_loop(worker, rx, runner).await;
            });
        }
        info!(queue_capacity = capacity, workers, "job manager started");

        Self {
            store,
            queue: tx,
            capacity,
            workers,
        }
    }

    async fn worker_loop(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, runner: TaskRunner) {
        loop {
            // Hold the lock only while waiting for the next job.
            let job = rx.lock().await.recv().await;
            let Some(Job { task_id, request }) = job else {
                break;
            };
            debug!(worker, %task_id, "worker picked up task");
            runner.run(task_id, request).await;
        }
        debug!(worker, "worker stopped");
    }

    /// Accept a request and return its id without waiting for the engine.
    ///
    /// The queue slot is reserved before the task record is created, so a
    /// rejected submission leaves no trace in the store.
    pub async fn submit(&self, request: OptimizationRequest) -> Result<TaskId, RuntimeError> {
        validate_request(&request).map_err(|e| RuntimeError::InvalidRequest(e.to_string()))?;

        let permit = self.queue.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => {
                warn!(capacity = self.capacity, "job queue full, rejecting task");
                RuntimeError::QueueFull {
                    capacity: self.capacity,
                }
            }
            TrySendError::Closed(()) => RuntimeError::Shutdown,
        })?;

        let request = Arc::new(request);
        let task_id = self.store.create(Arc::clone(&request)).await;
        info!(
            %task_id,
            ddl = request.ddl.len(),
            queries = request.queries.len(),
            "task accepted"
        );
        permit.send(Job { task_id, request });
        Ok(task_id)
    }

    /// Current lifecycle state of a task.
    pub async fn status(&self, task_id: TaskId) -> Result<TaskState, RuntimeError> {
        self.store.get(task_id).await.map(|view| view.state())
    }

    /// Proposal of a `DONE` task.
    ///
    /// Repeated calls return the same stored value.
    pub async fn result(&self, task_id: TaskId) -> Result<Arc<OptimizationResult>, RuntimeError> {
        match self.store.get(task_id).await?.status {
            TaskStatus::Running => Err(RuntimeError::NotReady { task_id }),
            TaskStatus::Done { result } => Ok(result),
            TaskStatus::Failed { error } => Err(RuntimeError::TaskFailed {
                task_id,
                failure: error,
            }),
        }
    }

    /// Full snapshot of a task.
    pub async fn task(&self, task_id: TaskId) -> Result<TaskView, RuntimeError> {
        self.store.get(task_id).await
    }

    /// Snapshot of every known task, newest first.
    pub async fn list(&self) -> Vec<TaskView> {
        self.store.list().await
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Accepted tasks still waiting for a worker.
    pub fn queued(&self) -> usize {
        self.capacity - self.queue.capacity()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
