//! Event data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted event row. Events are append-only; `terminal` holds the
/// serialized pane handle exactly as it was stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub agent_name: String,
    pub session_id: String,
    pub parent_session_id: String,
    pub category: String,
    pub title: String,
    pub message: String,
    pub project_cwd: String,
    pub git_branch: String,
    pub terminal: String,
    pub work_summary: String,
    pub created_at: String,
}

/// Filters for listing events.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub agent: Option<String>,
    pub category: Option<String>,
    /// Substring match against `project_cwd`.
    pub project: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<String>,
    pub limit: i64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            agent: None,
            category: None,
            project: None,
            since: None,
            limit: 50,
        }
    }
}

impl EventFilter {
    /// Clamp the limit into the 1..=1000 range.
    pub fn clamped_limit(&self) -> i64 {
        self.limit.clamp(1, 1000)
    }
}
