//! Mesh message endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::mesh::{CreateMessage, MeshOutcome, MessageRecord};

use super::events::int_param;

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub status: Option<String>,
    pub limit: Option<String>,
}

/// POST /api/messages: create a message and route it immediately.
pub async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessage>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if req.from_session.is_empty() || req.to_session.is_empty() {
        return Err(ApiError::bad_request("from_session and to_session required"));
    }
    if req.content.is_empty() {
        return Err(ApiError::bad_request("content required"));
    }

    let message_id = state.messages.insert(&req).await?;
    let outcome = state.mesh.route(message_id).await?;

    if let Some(stored) = state.messages.get(message_id).await? {
        let mut frame = serde_json::to_value(&stored).map_err(anyhow::Error::from)?;
        if let Some(obj) = frame.as_object_mut() {
            obj.insert("type".to_string(), json!("message"));
            obj.insert("routing".to_string(), json!(outcome.action()));
        }
        state.bus.broadcast(&frame);
    }

    let mut body = serde_json::to_value(&outcome).map_err(anyhow::Error::from)?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), json!(message_id));
    }
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> ApiResult<Json<Vec<MessageRecord>>> {
    let limit = int_param(&query.limit, 50);
    Ok(Json(state.messages.list(query.status.as_deref(), limit).await?))
}

/// GET /api/messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<MessageRecord>> {
    let message = state
        .messages
        .get(message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("message not found"))?;
    Ok(Json(message))
}

/// POST /api/messages/{id}/approve: deliver a pending message.
pub async fn approve_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> ApiResult<Response> {
    let outcome = state.mesh.approve(message_id).await?;

    if matches!(outcome, MeshOutcome::Delivered { .. }) {
        state.bus.broadcast(&json!({
            "type": "message_action",
            "action": "approved",
            "message_id": message_id,
        }));
        return Ok((StatusCode::OK, Json(outcome)).into_response());
    }

    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(outcome)).into_response())
}

/// POST /api/messages/{id}/reject: refuse a pending message.
pub async fn reject_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> ApiResult<Response> {
    let outcome = state.mesh.reject(message_id).await?;

    match outcome {
        MeshOutcome::Blocked { .. } => {
            state.bus.broadcast(&json!({
                "type": "message_action",
                "action": "rejected",
                "message_id": message_id,
            }));
            let body = json!({ "ok": true, "message_id": message_id, "status": "rejected" });
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        MeshOutcome::Error { error, .. } => {
            let body = json!({ "ok": false, "error": error });
            Ok((StatusCode::BAD_REQUEST, Json(body)).into_response())
        }
        _ => Ok((StatusCode::BAD_REQUEST, Json(json!({ "ok": false }))).into_response()),
    }
}
