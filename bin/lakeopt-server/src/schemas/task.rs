use lakeopt_core::{
    DdlStatement, OptimizationRequest, OptimizationResult, QueryItem, TaskStatus, TaskView,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// A single SQL statement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatementBody {
    #[schema(example = "CREATE TABLE lake.raw.orders (id bigint, ts timestamp)")]
    pub statement: String,
}

/// One workload query.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryBody {
    #[schema(example = "q1")]
    pub queryid: String,
    #[schema(example = "SELECT count(*) FROM lake.raw.orders")]
    pub query: String,
    /// How many times the query runs in the workload.
    #[schema(example = 120)]
    pub runquantity: u64,
}

/// Body of `POST /new`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTaskRequest {
    /// Warehouse connection string, stored as-is.
    #[schema(example = "jdbc:trino://trino.local:8080?catalog=lake")]
    pub url: String,
    pub ddl: Vec<StatementBody>,
    pub queries: Vec<QueryBody>,
}

impl From<NewTaskRequest> for OptimizationRequest {
    fn from(body: NewTaskRequest) -> Self {
        OptimizationRequest {
            url: body.url,
            ddl: body
                .ddl
                .into_iter()
                .map(|s| DdlStatement::new(s.statement))
                .collect(),
            queries: body
                .queries
                .into_iter()
                .map(|q| QueryItem {
                    queryid: q.queryid,
                    query: q.query,
                    runquantity: q.runquantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewTaskResponse {
    /// Identifier to pass as `task_id` to `/status` and `/getresult`.
    pub taskid: String,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct TaskIdQuery {
    /// Identifier returned by `POST /new`.
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// One of `RUNNING`, `DONE`, `FAILED`.
    #[schema(example = "RUNNING")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RewrittenQueryBody {
    pub queryid: String,
    pub query: String,
}

/// Body of `GET /getresult` for a finished task.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OptimizationResultResponse {
    /// Target schema; the first statement is always `CREATE SCHEMA`.
    pub ddl: Vec<StatementBody>,
    pub migrations: Vec<StatementBody>,
    pub queries: Vec<RewrittenQueryBody>,
}

impl From<&OptimizationResult> for OptimizationResultResponse {
    fn from(result: &OptimizationResult) -> Self {
        let statements = |list: &[DdlStatement]| -> Vec<StatementBody> {
            list.iter()
                .map(|s| StatementBody {
                    statement: s.statement.clone(),
                })
                .collect()
        };
        Self {
            ddl: statements(&result.ddl),
            migrations: statements(&result.migrations),
            queries: result
                .queries
                .iter()
                .map(|q| RewrittenQueryBody {
                    queryid: q.queryid.clone(),
                    query: q.query.clone(),
                })
                .collect(),
        }
    }
}

/// Error body.  `kind` is only present for failed tasks.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "EngineUnavailable")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskErrorBody {
    pub kind: String,
    pub message: String,
}

/// One entry of `GET /tasks`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    pub taskid: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskErrorBody>,
}

impl From<&TaskView> for TaskSummary {
    fn from(view: &TaskView) -> Self {
        let error = match &view.status {
            TaskStatus::Failed { error } => Some(TaskErrorBody {
                kind: error.kind.as_str().to_owned(),
                message: error.message.clone(),
            }),
            _ => None,
        };
        Self {
            taskid: view.task_id.to_string(),
            status: view.state().as_str().to_owned(),
            created_at: view.created_at.to_rfc3339(),
            updated_at: view.updated_at.to_rfc3339(),
            error,
        }
    }
}
