//! Health and the bundled dashboard.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use serde_json::{Value, json};

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::session::SessionStatus;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let sessions = state.sessions.list(None).await?;
    let active = sessions
        .iter()
        .filter(|s| matches!(s.status, SessionStatus::Active | SessionStatus::Waiting))
        .count();

    let uptime = state.started_at.elapsed().as_secs_f64();
    Ok(Json(json!({
        "status": "ok",
        "version": VERSION,
        "uptime": (uptime * 10.0).round() / 10.0,
        "sse_clients": state.bus.client_count(),
        "agents_total": sessions.len(),
        "agents_active": active,
    })))
}

/// GET `/`, `/ui`, `/dashboard`: the bundled single-file dashboard.
pub async fn dashboard() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Html(include_str!("../../../static/index.html")),
    )
}
