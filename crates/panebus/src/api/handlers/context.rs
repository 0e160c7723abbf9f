//! Shared context variables and daemon preferences.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::context::ContextVariable;

#[derive(Debug, Deserialize)]
pub struct ContextListQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextScopeQuery {
    #[serde(default = "global_scope")]
    pub scope: String,
}

fn global_scope() -> String {
    "global".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SetContextRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "global_scope")]
    pub scope: String,
    #[serde(default)]
    pub updated_by: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPreferenceRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// GET /api/context
pub async fn list_context(
    State(state): State<AppState>,
    Query(query): Query<ContextListQuery>,
) -> ApiResult<Json<Vec<ContextVariable>>> {
    Ok(Json(state.context.list(query.scope.as_deref()).await?))
}

/// POST /api/context
pub async fn set_context(
    State(state): State<AppState>,
    Json(req): Json<SetContextRequest>,
) -> ApiResult<Json<Value>> {
    if req.key.is_empty() {
        return Err(ApiError::bad_request("key required"));
    }
    state
        .context
        .set(&req.key, &req.value, &req.scope, &req.updated_by)
        .await?;
    Ok(Json(json!({
        "status": "ok",
        "key": req.key,
        "scope": req.scope,
        "value": req.value,
    })))
}

/// DELETE /api/context/{key}
pub async fn delete_context(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ContextScopeQuery>,
) -> ApiResult<Json<Value>> {
    if !state.context.delete(&key, &query.scope).await? {
        return Err(ApiError::not_found("context variable not found"));
    }
    Ok(Json(json!({ "status": "deleted" })))
}

/// GET /api/preferences
pub async fn list_preferences(
    State(state): State<AppState>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    Ok(Json(state.prefs.list().await?))
}

/// POST /api/preferences
pub async fn set_preference(
    State(state): State<AppState>,
    Json(req): Json<SetPreferenceRequest>,
) -> ApiResult<Json<Value>> {
    if req.key.is_empty() {
        return Err(ApiError::bad_request("key required"));
    }
    state.prefs.set(&req.key, &req.value).await?;
    Ok(Json(json!({ "status": "ok", "key": req.key, "value": req.value })))
}

/// DELETE /api/preferences/{key}
pub async fn delete_preference(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.prefs.delete(&key).await? {
        return Err(ApiError::not_found("preference not found"));
    }
    Ok(Json(json!({ "status": "deleted" })))
}
