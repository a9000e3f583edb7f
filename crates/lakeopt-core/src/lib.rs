//! lakeopt-core – asynchronous job lifecycle for data-lake optimization.
//!
//! A caller submits an [`OptimizationRequest`] (DDL + weighted workload) to the
//! [`JobManager`], which returns a [`TaskId`] immediately and hands the work to
//! a bounded pool of workers.  Each worker drives a [`TaskRunner`] that invokes
//! the external optimization engine through an [`EngineAdapter`], validates the
//! proposal and records exactly one terminal state in the [`TaskStore`].

mod runtime;

pub mod engine;
pub mod model;

pub use engine::{EngineAdapter, EngineError, OptimizationEngine};
pub use model::{
    DdlStatement, OptimizationRequest, OptimizationResult, QueryItem, RewrittenQuery,
};
pub use runtime::manager::{JobManager, ManagerConfig};
pub use runtime::runner::{RetryPolicy, TaskRunner};
pub use runtime::storage::{TaskStore, TaskView};
pub use runtime::types::{FailureKind, RuntimeError, TaskFailure, TaskId, TaskState, TaskStatus};
