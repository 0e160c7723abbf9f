//! Coordination rule endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::rules::{CreateRule, RuleRecord};

/// POST /api/rules
pub async fn post_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRule>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let rule_id = state.rules.insert(&req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": rule_id, "status": "created" })),
    ))
}

/// GET /api/rules
pub async fn list_rules(State(state): State<AppState>) -> ApiResult<Json<Vec<RuleRecord>>> {
    Ok(Json(state.rules.list().await?))
}

/// DELETE /api/rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.rules.delete(rule_id).await? {
        return Err(ApiError::not_found("rule not found"));
    }
    Ok(Json(json!({ "status": "deleted" })))
}
