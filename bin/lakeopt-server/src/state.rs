//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use lakeopt_core::JobManager;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Task submission and lookup.
    pub manager: JobManager,
}
