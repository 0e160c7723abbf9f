//! Event ingestion, listing, and the SSE stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use panebus_protocol::AgentEvent;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::event::{EventFilter, EventRecord};

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub agent: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub since: Option<String>,
    pub limit: Option<String>,
}

/// Parse a free-form query parameter as an integer, falling back on junk.
pub(super) fn int_param(raw: &Option<String>, default: i64) -> i64 {
    raw.as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// POST /api/events: ingest an event, broadcast it, then run after-work
/// routing.
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<AgentEvent>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if event.title.is_empty() && event.agent_name.is_empty() {
        return Err(ApiError::bad_request("title or agent_name required"));
    }

    let event_id = state.events.insert(&event).await?;
    state.sessions.upsert_from_event(&event).await?;

    // New activity clears any stall escalation for this session.
    if !event.session_id.is_empty() {
        state.monitor.clear_alert(&event.session_id);
    }

    if let Some(stored) = state.events.get(event_id).await? {
        state.bus.broadcast(&stored);
    }

    let route_results = state.router.route(&event).await?;
    for result in &route_results {
        let mut frame = serde_json::to_value(result).map_err(anyhow::Error::from)?;
        if let Some(obj) = frame.as_object_mut() {
            obj.insert("type".to_string(), json!("route"));
            obj.insert("session_id".to_string(), json!(event.session_id));
        }
        state.bus.broadcast(&frame);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": event_id, "status": "created" })),
    ))
}

/// GET /api/events: list with optional filters.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let filter = EventFilter {
        agent: query.agent,
        category: query.category,
        project: query.project,
        since: query.since,
        limit: int_param(&query.limit, 50),
    };
    Ok(Json(state.events.list(&filter).await?))
}

/// GET /api/events/stream: the SSE notification stream.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.bus.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|frame| frame.ok())
        .map(|json| Ok::<_, Infallible>(SseEvent::default().event("notification").data(json)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
