//! lakeopt-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Build the inference engine client and start the job manager.
//! 4. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use lakeopt_core::engine::{HuggingFaceConfig, HuggingFaceEngine};
use lakeopt_core::{EngineAdapter, JobManager, ManagerConfig, RetryPolicy, TaskRunner, TaskStore};
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: LAKEOPT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "lakeopt-server starting");

    // ── 3. Engine + job manager ────────────────────────────────────────────────
    if cfg.hf_token.is_none() {
        warn!("HF_TOKEN is not set; every task will fail with EngineUnavailable");
    }
    let engine = HuggingFaceEngine::new(HuggingFaceConfig {
        url: cfg.engine_url.clone(),
        token: cfg.hf_token.clone(),
        max_new_tokens: cfg.max_new_tokens,
        temperature: cfg.temperature,
        request_timeout: cfg.engine_timeout,
    })?;
    info!(url = %cfg.engine_url, timeout_secs = cfg.engine_timeout.as_secs(), "engine client ready");

    let runner = TaskRunner::new(
        TaskStore::new(),
        EngineAdapter::new(Arc::new(engine), cfg.engine_timeout),
        RetryPolicy::new(cfg.max_retries, cfg.retry_backoff),
    );
    let manager = JobManager::start(
        runner,
        ManagerConfig {
            queue_capacity: cfg.queue_capacity,
            workers: cfg.workers,
        },
    );

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        manager,
    });

    // ── 4. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("lakeopt-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
