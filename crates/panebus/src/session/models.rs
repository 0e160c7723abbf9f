//! Session data models.

use panebus_protocol::EventCategory;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Session status, derived from the category of the most recent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Agent is working.
    Active,
    /// Agent finished its last unit of work.
    Idle,
    /// Agent is blocked on an approval or question.
    Waiting,
    /// Agent reported an error.
    Error,
    /// Agent session ended.
    Ended,
}

impl SessionStatus {
    /// Map an event category to the resulting session status. Unknown
    /// categories count as activity.
    pub fn from_category(category: Option<EventCategory>) -> Self {
        match category {
            Some(EventCategory::Start) | Some(EventCategory::Auth) | None => Self::Active,
            Some(EventCategory::Completion) => Self::Idle,
            Some(EventCategory::Approval) | Some(EventCategory::Question) => Self::Waiting,
            Some(EventCategory::Error) => Self::Error,
            Some(EventCategory::Stop) => Self::Ended,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Error => "error",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "idle" => Ok(Self::Idle),
            "waiting" => Ok(Self::Waiting),
            "error" => Ok(Self::Error),
            "ended" => Ok(Self::Ended),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Current state of one agent session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentSession {
    pub session_id: String,
    pub parent_session_id: String,
    pub agent_name: String,
    pub project_cwd: String,
    pub git_branch: String,
    /// Serialized pane handle (`"{}"` when none has been reported).
    pub terminal: String,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    /// Raw category of the most recent event.
    pub last_event: String,
    pub first_seen: String,
    pub last_seen: String,
    /// Empty until the first heartbeat arrives.
    pub last_heartbeat: String,
    /// Empty until the session transitions to `ended`.
    pub ended_at: String,
    pub event_count: i64,
}

impl AgentSession {
    /// The parsed pane handle, if the session has one.
    pub fn terminal_handle(&self) -> Option<panebus_protocol::TerminalHandle> {
        panebus_protocol::TerminalHandle::from_json(&self.terminal)
    }
}
