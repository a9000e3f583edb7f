//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the form
//! `{"error": "..."}` with an appropriate status code.  Failed tasks add a
//! `kind` field naming the failure class.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lakeopt_core::RuntimeError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the lakeopt-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the job runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The caller referenced a task that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),

            ServerError::Runtime(e) => match e {
                RuntimeError::TaskNotFound { .. } => {
                    (StatusCode::NOT_FOUND, json!({ "error": e.to_string() }))
                }
                RuntimeError::NotReady { .. } => {
                    (StatusCode::CONFLICT, json!({ "error": e.to_string() }))
                }
                RuntimeError::TaskFailed { failure, .. } => (
                    StatusCode::CONFLICT,
                    json!({ "error": failure.message, "kind": failure.kind.as_str() }),
                ),
                RuntimeError::InvalidRequest(m) => {
                    (StatusCode::BAD_REQUEST, json!({ "error": m }))
                }
                RuntimeError::QueueFull { .. } | RuntimeError::Shutdown => {
                    warn!(error = %e, "rejecting submission");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        json!({ "error": e.to_string() }),
                    )
                }
                RuntimeError::InvalidTransition { .. } => {
                    error!(error = %e, "unexpected runtime error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "internal server error" }),
                    )
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use lakeopt_core::{TaskFailure, TaskId};
    use serde_json::Value;

    async fn render(err: ServerError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn failed_task_carries_kind() {
        let (status, body) = render(ServerError::Runtime(RuntimeError::TaskFailed {
            task_id: TaskId::generate(),
            failure: TaskFailure::validation("first DDL statement must be CREATE SCHEMA"),
        }))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "ValidationError");
        assert_eq!(body["error"], "first DDL statement must be CREATE SCHEMA");
    }

    #[tokio::test]
    async fn runtime_errors_map_to_status_codes() {
        let id = TaskId::generate();
        let cases = [
            (RuntimeError::TaskNotFound { task_id: id }, StatusCode::NOT_FOUND),
            (RuntimeError::NotReady { task_id: id }, StatusCode::CONFLICT),
            (RuntimeError::QueueFull { capacity: 1 }, StatusCode::SERVICE_UNAVAILABLE),
            (RuntimeError::Shutdown, StatusCode::SERVICE_UNAVAILABLE),
            (RuntimeError::InvalidRequest("dup".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            let (status, body) = render(ServerError::Runtime(err)).await;
            assert_eq!(status, expected);
            assert!(body["error"].is_string());
            assert!(body.get("kind").is_none());
        }
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let (status, body) = render(ServerError::Runtime(RuntimeError::InvalidTransition {
            task_id: TaskId::generate(),
            from: lakeopt_core::TaskState::Done,
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }
}
