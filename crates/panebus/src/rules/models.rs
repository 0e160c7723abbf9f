//! Rule data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a matched rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    // Mesh delivery policy
    Auto,
    Approve,
    Block,
    // After-work routing
    NextTask,
    Handoff,
    Spawn,
    Notify,
    Pipeline,
}

impl RuleAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "approve" => Some(Self::Approve),
            "block" => Some(Self::Block),
            "next_task" => Some(Self::NextTask),
            "handoff" => Some(Self::Handoff),
            "spawn" => Some(Self::Spawn),
            "notify" => Some(Self::Notify),
            "pipeline" => Some(Self::Pipeline),
            _ => None,
        }
    }

    /// Whether this action belongs to after-work routing rather than mesh
    /// delivery policy.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Self::NextTask | Self::Handoff | Self::Spawn | Self::Notify | Self::Pipeline
        )
    }
}

/// A persisted coordination rule.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleRecord {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: String,
    pub event_type: String,
    pub action: String,
    pub priority: i64,
    pub template: String,
    pub created_at: String,
}

impl RuleRecord {
    pub fn parsed_action(&self) -> Option<RuleAction> {
        RuleAction::parse(&self.action)
    }
}

/// Request body for creating a rule. Unset match keys default to wildcards.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRule {
    #[serde(default = "wildcard")]
    pub from_agent: String,
    #[serde(default = "wildcard")]
    pub to_agent: String,
    #[serde(default = "wildcard")]
    pub event_type: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub template: String,
}

fn wildcard() -> String {
    "*".to_string()
}

fn default_action() -> String {
    "approve".to_string()
}

/// The outcome of a specificity-cascade lookup. When no rule matches, the
/// synthetic default is `approve` with an empty template.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleMatch {
    pub action: String,
    pub template: String,
    pub priority: i64,
}

impl Default for RuleMatch {
    fn default() -> Self {
        Self {
            action: "approve".to_string(),
            template: String::new(),
            priority: 0,
        }
    }
}
