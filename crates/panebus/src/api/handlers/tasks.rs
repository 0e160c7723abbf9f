//! Task DAG endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::tasks::{CreateTask, Task, TaskPatch};

use super::events::int_param;

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub session_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextTaskQuery {
    pub session_id: Option<String>,
}

/// POST /api/tasks
pub async fn post_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTask>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if req.title.is_empty() {
        return Err(ApiError::bad_request("title required"));
    }
    let task_id = state.tasks.insert(&req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": task_id, "status": "created" })),
    ))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let limit = int_param(&query.limit, 100);
    let tasks = state
        .tasks
        .list(query.session_id.as_deref(), query.status.as_deref(), limit)
        .await?;
    Ok(Json(tasks))
}

/// GET /api/tasks/next: the next actionable task, if any.
pub async fn next_task(
    State(state): State<AppState>,
    Query(query): Query<NextTaskQuery>,
) -> ApiResult<Json<Value>> {
    match state.tasks.next_task(query.session_id.as_deref()).await? {
        Some(task) => Ok(Json(serde_json::to_value(task).map_err(anyhow::Error::from)?)),
        None => Ok(Json(json!({ "message": "no actionable tasks" }))),
    }
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = state
        .tasks
        .get(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    Ok(Json(task))
}

/// PUT /api/tasks/{id}: patch fields, returning the updated row.
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<Task>> {
    if !state.tasks.update(task_id, &patch).await? {
        return Err(ApiError::not_found("task not found"));
    }
    let task = state
        .tasks
        .get(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    Ok(Json(task))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.tasks.delete(task_id).await? {
        return Err(ApiError::not_found("task not found"));
    }
    Ok(Json(json!({ "status": "deleted" })))
}
