use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use subtask_model::{
    AgentStats, Statistics, TaskId, TaskQuery, TaskRequest, TaskResult, TaskStatus,
};

use crate::{error::ApiError, handler::ApiHandler, handler::SubmitTask};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    /// Create new HTTP API with the given handler.
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/tasks - Submit task (`?wait=true` awaits the result)
    /// - GET /api/v1/tasks - List live tasks (agent/status/limit/offset)
    /// - GET /api/v1/tasks/:id - Get one live task
    /// - POST /api/v1/tasks/:id/cancel - Cancel an active task
    /// - POST /api/v1/agents/:id/cancel - Cancel an agent's backlog
    /// - GET /api/v1/agents/:id/stats - Per-agent counters
    /// - GET /api/v1/stats - Engine-wide statistics
    pub fn router(self) -> Router {
        Router::new()
            .route(
                "/api/v1/tasks",
                post(submit_task::<H>).get(list_tasks::<H>),
            )
            .route("/api/v1/tasks/{id}", get(get_task::<H>))
            .route("/api/v1/tasks/{id}/cancel", post(cancel_task::<H>))
            .route("/api/v1/agents/{id}/cancel", post(cancel_agent::<H>))
            .route("/api/v1/agents/{id}/stats", get(agent_stats::<H>))
            .route("/api/v1/stats", get(stats::<H>))
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitParams {
    /// When set, the response carries the full terminal result instead of
    /// just the accepted task id.
    #[serde(default)]
    wait: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubmitTaskResponse {
    task_id: String,
}

#[derive(Debug, Serialize)]
struct TaskView {
    #[serde(flatten)]
    request: TaskRequest,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct GetTaskResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<TaskView>,
}

#[derive(Debug, Deserialize)]
struct ListTasksParams {
    /// Filter by agent id
    agent: Option<String>,
    /// Filter by task status (queued | active)
    status: Option<String>,
    /// Max items per page (default 100, max 1000)
    limit: Option<usize>,
    /// Offset for pagination (default 0)
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListTasksResponse {
    tasks: Vec<TaskRequest>,
    total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/tasks
async fn submit_task<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<SubmitParams>,
    Json(body): Json<SubmitTask>,
) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    debug!(agent = %body.agent_id, task_type = %body.task_type, wait = params.wait, "submitting task");
    let submission = handler.submit_task(body).await?;

    if params.wait {
        let result: TaskResult = submission.wait().await;
        return Ok(Json(result).into_response());
    }

    let task_id = submission.task_id().clone();
    // Detached submissions still settle; their results end up in the log.
    tokio::spawn(async move {
        let result = submission.wait().await;
        debug!(task = %result.id, status = ?result.status, "detached submission settled");
    });

    let response = SubmitTaskResponse {
        task_id: task_id.to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// GET /api/v1/tasks/:id
async fn get_task<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let task_id = TaskId::from(id);
    let info = handler
        .get_task(&task_id)
        .await?
        .map(|(request, status)| TaskView { request, status });

    Ok(Json(GetTaskResponse { info }))
}

/// GET /api/v1/tasks
///
/// Query params (all optional, combinable):
/// - ?agent=name   - filter by agent id
/// - ?status=queued - filter by status
/// - ?limit=50     - max items per page (default 100, max 1000)
/// - ?offset=0     - pagination offset (default 0)
async fn list_tasks<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<ListTasksParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let mut query = TaskQuery::new();

    if let Some(agent) = params.agent {
        if agent.trim().is_empty() {
            return Err(ApiError::InvalidRequest("agent cannot be empty".into()));
        }
        query = query.with_agent(agent);
    }

    if let Some(status_str) = params.status {
        let status: TaskStatus = status_str
            .parse()
            .map_err(|e: subtask_model::ParseStatusError| ApiError::InvalidRequest(e.to_string()))?;
        query = query.with_status(status);
    }

    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }

    if let Some(offset) = params.offset {
        query = query.with_offset(offset);
    }

    let page = handler.query_tasks(query).await?;
    debug!(count = page.items.len(), total = page.total, "tasks listed");

    Ok(Json(ListTasksResponse {
        tasks: page.items,
        total: page.total,
    }))
}

/// POST /api/v1/tasks/:id/cancel
async fn cancel_task<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("task id cannot be empty".into()));
    }

    let task_id = TaskId::from(id);
    handler.cancel_task(&task_id).await?;
    debug!(%task_id, "task cancelled");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/agents/:id/cancel
async fn cancel_agent<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.cancel_agent(&id).await?;
    debug!(agent = %id, "agent backlog cancelled");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/agents/:id/stats
async fn agent_stats<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let stats: AgentStats = handler.agent_stats(&id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/stats
async fn stats<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let stats: Statistics = handler.stats().await?;
    Ok(Json(stats))
}
