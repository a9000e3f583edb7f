//! The external optimization capability and everything that talks to it.
//!
//! - [`OptimizationEngine`] is the single abstract capability: DDL + workload
//!   in, candidate proposal out.
//! - [`EngineAdapter`] makes exactly one bounded call against an engine and
//!   turns the outcome into a validated result or a classified
//!   [`TaskFailure`](crate::TaskFailure).
//! - [`validate`] holds the structural checks applied to every proposal.
//! - [`huggingface`] is the concrete client for a hosted text-generation model.

pub mod adapter;
pub mod huggingface;
pub mod prompt;
pub mod validate;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{OptimizationRequest, OptimizationResult};

pub use adapter::EngineAdapter;
pub use huggingface::{HuggingFaceConfig, HuggingFaceEngine};
pub use validate::ValidationError;

/// Failures reported by an engine implementation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine could not be reached (network, credentials, overload).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine answered, but with an error or unusable content.
    #[error("engine failed: {0}")]
    Failed(String),
}

/// Turns a data-lake description and workload into an optimization proposal.
///
/// Implementations perform a single attempt per call; timeouts and retries
/// are applied by the caller.
#[async_trait]
pub trait OptimizationEngine: Send + Sync {
    async fn optimize(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, EngineError>;
}
