use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::validate::validate_result;
use crate::engine::{EngineError, OptimizationEngine};
use crate::model::{OptimizationRequest, OptimizationResult};
use crate::runtime::types::TaskFailure;

/// Makes one bounded engine call and classifies the outcome.
///
/// The adapter owns the timeout; the engine implementation does not need to
/// enforce one of its own.  A proposal is only returned after it passes
/// [`validate_result`].
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn OptimizationEngine>,
    timeout: Duration,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn OptimizationEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub async fn invoke(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, TaskFailure> {
        let outcome = tokio::time::timeout(self.timeout, self.engine.optimize(request)).await;

        let result = match outcome {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "engine call timed out");
                return Err(TaskFailure::unavailable(format!(
                    "engine did not answer within {}s",
                    self.timeout.as_secs_f64()
                )));
            }
            Ok(Err(EngineError::Unavailable(msg))) => return Err(TaskFailure::unavailable(msg)),
            Ok(Err(EngineError::Failed(msg))) => return Err(TaskFailure::engine(msg)),
            Ok(Ok(result)) => result,
        };

        validate_result(request, &result).map_err(|e| {
            debug!(error = %e, "engine proposal rejected");
            TaskFailure::validation(e.to_string())
        })?;
        Ok(result)
    }
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
