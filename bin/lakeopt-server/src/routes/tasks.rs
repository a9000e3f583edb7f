//! Task endpoints.
//!
//! `POST /new` hands the request to the job manager and answers with the new
//! task id straight away; the caller then polls `/status` and fetches the
//! proposal from `/getresult`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lakeopt_core::TaskId;
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::task::{
    ErrorResponse, NewTaskRequest, NewTaskResponse, OptimizationResultResponse, QueryBody,
    RewrittenQueryBody, StatementBody, StatusResponse, TaskErrorBody, TaskIdQuery, TaskSummary,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_task, get_status, get_result, list_tasks),
    components(schemas(
        NewTaskRequest,
        NewTaskResponse,
        StatementBody,
        QueryBody,
        StatusResponse,
        OptimizationResultResponse,
        RewrittenQueryBody,
        TaskSummary,
        TaskErrorBody,
        ErrorResponse,
    ))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/new", post(create_task))
        .route("/status", get(get_status))
        .route("/getresult", get(get_result))
        .route("/tasks", get(list_tasks))
}

/// Resolve `task_id`: absent is a bad request, anything that is not a known
/// id (including strings that are not UUIDs) is not found.
fn parse_task_id(query: TaskIdQuery) -> Result<TaskId, ServerError> {
    let raw = query
        .task_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("query parameter `task_id` is required".into()))?;
    raw.parse()
        .map_err(|_| ServerError::NotFound(format!("task not found: {raw}")))
}

#[utoipa::path(
    post,
    path = "/new",
    tag = "tasks",
    request_body = NewTaskRequest,
    responses(
        (status = 200, description = "Task accepted", body = NewTaskResponse),
        (status = 400, description = "Malformed or invalid request", body = ErrorResponse),
        (status = 503, description = "Job queue is full", body = ErrorResponse),
    )
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTaskRequest>, JsonRejection>,
) -> Result<Json<NewTaskResponse>, ServerError> {
    let Json(body) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let task_id = state.manager.submit(body.into()).await?;
    Ok(Json(NewTaskResponse {
        taskid: task_id.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "tasks",
    params(TaskIdQuery),
    responses(
        (status = 200, description = "Current task state", body = StatusResponse),
        (status = 400, description = "Missing task_id", body = ErrorResponse),
        (status = 404, description = "Unknown task", body = ErrorResponse),
    )
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<StatusResponse>, ServerError> {
    let task_id = parse_task_id(query)?;
    let status = state.manager.status(task_id).await?;
    debug!(%task_id, %status, "status polled");
    Ok(Json(StatusResponse {
        status: status.as_str().to_owned(),
    }))
}

#[utoipa::path(
    get,
    path = "/getresult",
    tag = "tasks",
    params(TaskIdQuery),
    responses(
        (status = 200, description = "Optimization proposal", body = OptimizationResultResponse),
        (status = 400, description = "Missing task_id", body = ErrorResponse),
        (status = 404, description = "Unknown task", body = ErrorResponse),
        (status = 409, description = "Task still running, or failed (`kind` set)", body = ErrorResponse),
    )
)]
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<OptimizationResultResponse>, ServerError> {
    let task_id = parse_task_id(query)?;
    let result = state.manager.result(task_id).await?;
    Ok(Json(OptimizationResultResponse::from(result.as_ref())))
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "All tasks, newest first", body = [TaskSummary]),
    )
)]
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSummary>> {
    let tasks = state.manager.list().await;
    Json(tasks.iter().map(TaskSummary::from).collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lakeopt_core::{
        EngineError, OptimizationEngine, OptimizationRequest, OptimizationResult, TaskState,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::routes::testing::{Echo, body_json, proposal_for, router_with};

    struct Failing;

    #[async_trait::async_trait]
    impl OptimizationEngine for Failing {
        async fn optimize(
            &self,
            _request: &OptimizationRequest,
        ) -> Result<OptimizationResult, EngineError> {
            Err(EngineError::Failed("model returned garbage".into()))
        }
    }

    struct Never;

    #[async_trait::async_trait]
    impl OptimizationEngine for Never {
        async fn optimize(
            &self,
            _request: &OptimizationRequest,
        ) -> Result<OptimizationResult, EngineError> {
            std::future::pending().await
        }
    }

    fn new_body() -> Value {
        json!({
            "url": "jdbc:trino://trino.local:8080?catalog=lake",
            "ddl": [{ "statement": "CREATE TABLE lake.raw.orders (id bigint, ts timestamp)" }],
            "queries": [
                { "queryid": "q1", "query": "SELECT count(*) FROM lake.raw.orders", "runquantity": 120 },
                { "queryid": "q2", "query": "SELECT id FROM lake.raw.orders WHERE ts > now()", "runquantity": 7 }
            ]
        })
    }

    fn post_new(body: &Value) -> Request<Body> {
        Request::post("/new")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn submit(app: &axum::Router) -> String {
        let response = app.clone().oneshot(post_new(&new_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["taskid"].as_str().unwrap().to_owned()
    }

    async fn wait_for(app: &axum::Router, taskid: &str, expected: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let response = app
                    .clone()
                    .oneshot(get(&format!("/status?task_id={taskid}")))
                    .await
                    .unwrap();
                if body_json(response).await["status"] == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task should reach the expected state");
    }

    #[tokio::test]
    async fn submit_poll_and_fetch() {
        let (app, _) = router_with(Echo);

        let taskid = submit(&app).await;
        wait_for(&app, &taskid, "DONE").await;

        let response = app
            .clone()
            .oneshot(get(&format!("/getresult?task_id={taskid}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        let request: OptimizationRequest = serde_json::from_value(new_body()).unwrap();
        let expected = serde_json::to_value(proposal_for(&request)).unwrap();
        assert_eq!(body, expected);

        // Fetching again returns the same proposal.
        let again = app
            .clone()
            .oneshot(get(&format!("/getresult?task_id={taskid}")))
            .await
            .unwrap();
        assert_eq!(body_json(again).await, expected);
    }

    #[tokio::test]
    async fn running_task_reports_running_and_conflict() {
        let (app, _) = router_with(Never);
        let taskid = submit(&app).await;

        let response = app
            .clone()
            .oneshot(get(&format!("/status?task_id={taskid}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "RUNNING" }));

        let response = app
            .clone()
            .oneshot(get(&format!("/getresult?task_id={taskid}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not ready"));
        assert!(body.get("kind").is_none());
    }

    #[tokio::test]
    async fn failed_task_exposes_error_kind() {
        let (app, _) = router_with(Failing);
        let taskid = submit(&app).await;
        wait_for(&app, &taskid, "FAILED").await;

        let response = app
            .clone()
            .oneshot(get(&format!("/getresult?task_id={taskid}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "EngineError");
        assert_eq!(body["error"], "model returned garbage");
    }

    #[tokio::test]
    async fn unknown_and_missing_ids() {
        let (app, _) = router_with(Echo);

        for uri in [
            "/status?task_id=3f2b8c1e-0000-4000-8000-000000000000",
            "/getresult?task_id=3f2b8c1e-0000-4000-8000-000000000000",
            "/status?task_id=not-a-task",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(body_json(response).await["error"].is_string());
        }

        for uri in ["/status", "/getresult", "/status?task_id="] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let (app, manager) = router_with(Echo);

        let mut negative = new_body();
        negative["queries"][0]["runquantity"] = json!(-1);
        let mut duplicate = new_body();
        duplicate["queries"][1]["queryid"] = json!("q1");
        let mut unqualified = new_body();
        unqualified["queries"][0]["query"] = json!("SELECT * FROM orders");

        for body in [json!({ "url": "x" }), negative, duplicate, unqualified] {
            let response = app.clone().oneshot(post_new(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(body_json(response).await["error"].is_string());
        }

        let response = app
            .clone()
            .oneshot(
                Request::post("/new")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn empty_workload_is_accepted() {
        let (app, _) = router_with(Echo);
        let body = json!({ "url": "jdbc:trino://x", "ddl": [], "queries": [] });
        let response = app.clone().oneshot(post_new(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn full_queue_answers_service_unavailable() {
        let (app, manager) = crate::routes::testing::router_with_sizing(Never, 1, 1);

        submit(&app).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.queued() > 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("worker should pick up the first task");
        submit(&app).await;

        let response = app.clone().oneshot(post_new(&new_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(manager.list().await.len(), 2);
    }

    #[tokio::test]
    async fn listing_shows_every_task() {
        let (app, manager) = router_with(Failing);
        let taskid = submit(&app).await;
        wait_for(&app, &taskid, "FAILED").await;

        let response = app.clone().oneshot(get("/tasks")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let tasks = body.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["taskid"], taskid.as_str());
        assert_eq!(tasks[0]["status"], "FAILED");
        assert_eq!(tasks[0]["error"]["kind"], "EngineError");

        let id = taskid.parse().unwrap();
        assert_eq!(manager.status(id).await.unwrap(), TaskState::Failed);
    }
}
