//! Mesh message data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery state of a mesh message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Rejected,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("unknown message status: {s}")),
        }
    }
}

impl TryFrom<String> for MessageStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// A persisted mesh message.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRecord {
    pub id: i64,
    pub from_session: String,
    pub to_session: String,
    pub message_type: String,
    pub content: String,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub created_at: String,
    pub delivered_at: Option<String>,
}

/// Request body for creating a mesh message.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessage {
    #[serde(default)]
    pub from_session: String,
    #[serde(default)]
    pub to_session: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub content: String,
}

fn default_message_type() -> String {
    "handoff".to_string()
}

/// Result of routing a message, serialized with an `action` discriminator so
/// it can be merged into API responses and SSE frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum MeshOutcome {
    /// Auto-delivered (or manually approved) and typed into the target pane.
    Delivered { message_id: i64 },
    /// Waiting for manual approval.
    Pending { message_id: i64 },
    /// Rejected by a `block` rule.
    Blocked { reason: String },
    /// Routing or delivery failed; the message row is left as it was.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<i64>,
        error: String,
    },
}

impl MeshOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Pending { .. } => "pending",
            Self::Blocked { .. } => "blocked",
            Self::Error { .. } => "error",
        }
    }
}
