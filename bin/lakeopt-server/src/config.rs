//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use lakeopt_core::engine::huggingface::DEFAULT_INFERENCE_URL;

/// Runtime configuration for lakeopt-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.  Engine calls fail as unavailable until `HF_TOKEN` is given.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Tasks that may wait for a worker before `/new` answers 503.
    pub queue_capacity: usize,

    /// Tasks executed concurrently.
    pub workers: usize,

    /// Upper bound on a single engine call.
    pub engine_timeout: Duration,

    /// Extra engine attempts after a retryable failure.
    pub max_retries: u32,

    /// Pause between engine attempts.
    pub retry_backoff: Duration,

    /// Text-generation inference endpoint.
    pub engine_url: String,

    /// Bearer token for the inference endpoint.
    pub hf_token: Option<String>,

    pub max_new_tokens: u32,

    pub temperature: f32,

    /// Comma-separated allowed origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            queue_capacity: 64,
            workers: 4,
            engine_timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_backoff: Duration::ZERO,
            engine_url: DEFAULT_INFERENCE_URL.to_owned(),
            hf_token: None,
            max_new_tokens: 2048,
            temperature: 0.3,
            cors_allowed_origins: None,
            enable_swagger: true,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: lookup("LAKEOPT_BIND").unwrap_or(defaults.bind_address),
            log_level: lookup("LAKEOPT_LOG").unwrap_or(defaults.log_level),
            log_json: parse_bool(lookup("LAKEOPT_LOG_JSON"), defaults.log_json),
            queue_capacity: parse_or(lookup("LAKEOPT_QUEUE_CAPACITY"), defaults.queue_capacity),
            workers: parse_or(lookup("LAKEOPT_WORKERS"), defaults.workers),
            engine_timeout: lookup("LAKEOPT_ENGINE_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.engine_timeout),
            max_retries: parse_or(lookup("LAKEOPT_MAX_RETRIES"), defaults.max_retries),
            retry_backoff: lookup("LAKEOPT_RETRY_BACKOFF_MS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            engine_url: lookup("LAKEOPT_ENGINE_URL").unwrap_or(defaults.engine_url),
            hf_token: lookup("HF_TOKEN").filter(|t| !t.trim().is_empty()),
            max_new_tokens: parse_or(lookup("LAKEOPT_MAX_NEW_TOKENS"), defaults.max_new_tokens),
            temperature: parse_or(lookup("LAKEOPT_TEMPERATURE"), defaults.temperature),
            cors_allowed_origins: lookup("LAKEOPT_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            enable_swagger: parse_bool(lookup("LAKEOPT_ENABLE_SWAGGER"), defaults.enable_swagger),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:8000");
        assert_eq!(cfg.engine_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.queue_capacity, 64);
        assert!(cfg.hf_token.is_none());
        assert!(cfg.enable_swagger);
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = config(&[
            ("LAKEOPT_ENGINE_TIMEOUT_SECS", "5"),
            ("LAKEOPT_MAX_RETRIES", "2"),
            ("LAKEOPT_RETRY_BACKOFF_MS", "250"),
            ("LAKEOPT_LOG_JSON", "TRUE"),
            ("LAKEOPT_ENABLE_SWAGGER", "false"),
            ("HF_TOKEN", "hf_abc"),
        ]);
        assert_eq!(cfg.engine_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(250));
        assert!(cfg.log_json);
        assert!(!cfg.enable_swagger);
        assert_eq!(cfg.hf_token.as_deref(), Some("hf_abc"));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let cfg = config(&[("LAKEOPT_WORKERS", "many"), ("HF_TOKEN", "  ")]);
        assert_eq!(cfg.workers, 4);
        assert!(cfg.hf_token.is_none());
    }
}
