//! Session listing and two-way pane control.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use panebus_protocol::AgentEvent;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::event::EventRecord;
use crate::session::AgentSession;
use crate::terminal::parse_handle;

use super::events::int_param;

#[derive(Debug, Deserialize)]
pub struct AgentListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentEventsQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpawnRequest {
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub cwd: String,
}

fn default_agent() -> String {
    "claude".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub session_id: String,
}

/// GET /api/agents
pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentListQuery>,
) -> ApiResult<Json<Vec<AgentSession>>> {
    Ok(Json(state.sessions.list(query.status.as_deref()).await?))
}

/// GET /api/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AgentSession>> {
    let session = state
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("session not found"))?;
    Ok(Json(session))
}

/// GET /api/agents/{id}/events
pub async fn agent_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<AgentEventsQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    if state.sessions.get(&session_id).await?.is_none() {
        return Err(ApiError::not_found("session not found"));
    }
    let limit = int_param(&query.limit, 50);
    Ok(Json(state.events.for_session(&session_id, limit).await?))
}

/// GET /api/agents/{id}/children
pub async fn agent_children(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<AgentSession>>> {
    Ok(Json(state.sessions.children(&session_id).await?))
}

/// POST /api/agents/spawn: open a new pane running an agent and register
/// it as a tracked session.
pub async fn spawn_agent(
    State(state): State<AppState>,
    Json(req): Json<SpawnRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let spawned = state
        .driver
        .spawn_pane(&req.agent, &req.prompt, &req.cwd)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    // Spawn ids are random; a collision is retried once, then hard-fails.
    let mut session_id = spawn_session_id();
    if state.sessions.get(&session_id).await?.is_some() {
        session_id = spawn_session_id();
        if state.sessions.get(&session_id).await?.is_some() {
            return Err(ApiError::internal("session id collision"));
        }
    }

    let agent_display = capitalize(&req.agent);
    let event = AgentEvent {
        agent_name: agent_display.clone(),
        session_id: session_id.clone(),
        category: "start".to_string(),
        title: format!("{agent_display}: Spawned from daemon"),
        message: if req.prompt.is_empty() {
            "New session".to_string()
        } else {
            req.prompt.clone()
        },
        project_cwd: req.cwd.clone(),
        terminal: Some(spawned.handle.clone()),
        ..Default::default()
    };
    state.events.insert(&event).await?;
    state.sessions.upsert_from_event(&event).await?;

    state.bus.broadcast(&json!({
        "type": "spawn",
        "action": "spawned",
        "session_id": session_id,
        "agent_name": agent_display,
        "pane_id": spawned.pane_id,
    }));

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "spawned",
            "session_id": session_id,
            "pane_id": spawned.pane_id,
            "terminal": spawned.handle,
        })),
    ))
}

/// POST /api/agents/{id}/stop: interrupt the pane, then mark the session
/// ended. The session ends even when the pane is already gone.
pub async fn stop_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("session not found"))?;

    let pane_result = match parse_handle(&session.terminal) {
        Ok(handle) => state.driver.stop_gracefully(&handle).await,
        Err(err) => Err(err),
    };

    let stop_event = AgentEvent {
        agent_name: session.agent_name.clone(),
        session_id: session_id.clone(),
        category: "stop".to_string(),
        title: format!("{}: Stopped by user", session.agent_name),
        ..Default::default()
    };
    state.events.insert(&stop_event).await?;
    state.sessions.upsert_from_event(&stop_event).await?;

    state.bus.broadcast(&json!({
        "type": "action",
        "action": "stop",
        "session_id": session_id,
        "agent_name": session.agent_name,
    }));

    match pane_result {
        Ok(()) => Ok(Json(json!({ "status": "stopped", "session_id": session_id }))),
        Err(err) => Ok(Json(json!({
            "status": "stopped",
            "session_id": session_id,
            "warning": err.to_string(),
        }))),
    }
}

/// POST /api/agents/{id}/approve
pub async fn approve_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    control_action(&state, &session_id, "approve", "approved", None).await
}

/// POST /api/agents/{id}/reject
pub async fn reject_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    control_action(&state, &session_id, "reject", "rejected", None).await
}

/// POST /api/agents/{id}/interrupt
pub async fn interrupt_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    control_action(&state, &session_id, "interrupt", "interrupted", None).await
}

/// POST /api/agents/{id}/send: type arbitrary text into the pane.
pub async fn send_to_agent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SendRequest>,
) -> ApiResult<Json<Value>> {
    if req.text.is_empty() {
        return Err(ApiError::bad_request("text required"));
    }
    control_action(&state, &session_id, "send", "sent", Some(req.text)).await
}

/// POST /api/heartbeat: bump the session's liveness clock.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<Value>> {
    if req.session_id.is_empty() {
        return Err(ApiError::bad_request("session_id required"));
    }
    if !state.sessions.heartbeat(&req.session_id).await? {
        return Err(ApiError::not_found("session not found"));
    }
    state.monitor.clear_alert(&req.session_id);
    Ok(Json(json!({ "status": "ok" })))
}

/// Shared body of the pane control endpoints: look up the session, run the
/// keystroke, broadcast, report.
async fn control_action(
    state: &AppState,
    session_id: &str,
    action: &str,
    done_status: &str,
    send_text: Option<String>,
) -> ApiResult<Json<Value>> {
    let session = state
        .sessions
        .get(session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("session not found"))?;

    let handle =
        parse_handle(&session.terminal).map_err(|err| ApiError::internal(err.to_string()))?;

    let result = match (action, &send_text) {
        ("send", Some(text)) => {
            let mut text = text.clone();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            state.driver.send_text(&handle, &text).await
        }
        ("approve", _) => state.driver.send_approve(&handle).await,
        ("reject", _) => state.driver.send_reject(&handle).await,
        ("interrupt", _) => state.driver.send_interrupt(&handle).await,
        _ => unreachable!("unknown control action"),
    };

    result.map_err(|err| ApiError::internal(err.to_string()))?;

    let mut frame = json!({
        "type": "action",
        "action": action,
        "session_id": session_id,
        "agent_name": session.agent_name,
    });
    if let (Some(obj), Some(text)) = (frame.as_object_mut(), send_text) {
        obj.insert("text".to_string(), json!(text));
    }
    state.bus.broadcast(&frame);

    Ok(Json(json!({ "status": done_status, "session_id": session_id })))
}

fn spawn_session_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("spawn-{}", &hex[..12])
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_ids_are_prefixed_twelve_hex() {
        let id = spawn_session_id();
        let suffix = id.strip_prefix("spawn-").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("claude"), "Claude");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("x"), "X");
    }
}
