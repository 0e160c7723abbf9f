//! The event envelope agents POST to the daemon.

use serde::{Deserialize, Serialize};

use crate::terminal::{self, TerminalHandle};

/// What happened at the agent.
///
/// The daemon derives a session status from this, but stores the raw
/// category text so unknown categories survive round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Agent session started.
    Start,
    /// Agent finished a unit of work.
    Completion,
    /// Agent is waiting for an approval prompt.
    Approval,
    /// Agent asked the user a question.
    Question,
    /// Agent hit an error.
    Error,
    /// Agent needs (re)authentication.
    Auth,
    /// Agent session ended.
    Stop,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Completion => "completion",
            Self::Approval => "approval",
            Self::Question => "question",
            Self::Error => "error",
            Self::Auth => "auth",
            Self::Stop => "stop",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "completion" => Ok(Self::Completion),
            "approval" => Ok(Self::Approval),
            "question" => Ok(Self::Question),
            "error" => Ok(Self::Error),
            "auth" => Ok(Self::Auth),
            "stop" => Ok(Self::Stop),
            _ => Err(format!("unknown event category: {s}")),
        }
    }
}

impl EventCategory {
    /// Whether this category triggers after-work routing.
    pub fn is_after_work(&self) -> bool {
        matches!(self, Self::Completion | Self::Stop)
    }
}

/// An event as posted by an agent hook or the daemon itself.
///
/// Every field except `category` defaults to empty; the daemon accepts a
/// payload as long as it names an agent or carries a title.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub parent_session_id: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub project_cwd: String,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub work_summary: String,
    #[serde(default, deserialize_with = "terminal::de_opt_handle")]
    pub terminal: Option<TerminalHandle>,
}

fn default_category() -> String {
    "completion".to_string()
}

impl AgentEvent {
    /// The parsed category, if it is one the daemon knows.
    pub fn parsed_category(&self) -> Option<EventCategory> {
        self.category.parse().ok()
    }

    /// The terminal column text for persistence (`"{}"` when absent).
    pub fn terminal_json(&self) -> String {
        self.terminal
            .as_ref()
            .map(TerminalHandle::to_json)
            .unwrap_or_else(|| "{}".to_string())
    }
}
