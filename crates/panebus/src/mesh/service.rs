//! Rule-driven message routing.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::db::now_iso;
use crate::rules::RuleRepository;
use crate::session::SessionRepository;
use crate::terminal::{PaneDriver, parse_handle};

use super::models::{MeshOutcome, MessageRecord, MessageStatus};
use super::repository::MessageRepository;

/// Routes newly created mesh messages and handles manual moderation.
pub struct MeshRouter {
    messages: MessageRepository,
    sessions: SessionRepository,
    rules: RuleRepository,
    driver: Arc<dyn PaneDriver>,
}

impl MeshRouter {
    pub fn new(
        messages: MessageRepository,
        sessions: SessionRepository,
        rules: RuleRepository,
        driver: Arc<dyn PaneDriver>,
    ) -> Self {
        Self {
            messages,
            sessions,
            rules,
            driver,
        }
    }

    /// Route a pending message per the coordination rules.
    ///
    /// `block` rejects it, `auto` delivers it immediately, anything else
    /// leaves it pending for manual approval. A missing target is reported
    /// as an error without touching the row.
    pub async fn route(&self, message_id: i64) -> Result<MeshOutcome> {
        let Some(msg) = self.messages.get(message_id).await? else {
            return Ok(MeshOutcome::Error {
                message_id: None,
                error: "message not found".to_string(),
            });
        };

        let from_session = self.sessions.get(&msg.from_session).await?;
        let Some(to_session) = self.sessions.get(&msg.to_session).await? else {
            return Ok(MeshOutcome::Error {
                message_id: Some(message_id),
                error: format!("target session not found: {}", msg.to_session),
            });
        };

        let from_agent = from_session
            .as_ref()
            .map(|s| s.agent_name.as_str())
            .unwrap_or("unknown");
        let rule = self
            .rules
            .match_rule(from_agent, &to_session.agent_name, &msg.message_type)
            .await?;

        match rule.action.as_str() {
            "block" => {
                self.messages
                    .update_status(message_id, MessageStatus::Rejected, None)
                    .await?;
                info!(message_id, "mesh message blocked by rule");
                Ok(MeshOutcome::Blocked {
                    reason: "coordination rule".to_string(),
                })
            }
            "auto" => self.deliver(&msg, &to_session.terminal).await,
            _ => Ok(MeshOutcome::Pending { message_id }),
        }
    }

    /// Manually approve a pending message, delivering it to the target pane.
    pub async fn approve(&self, message_id: i64) -> Result<MeshOutcome> {
        let Some(msg) = self.messages.get(message_id).await? else {
            return Ok(MeshOutcome::Error {
                message_id: None,
                error: "message not found".to_string(),
            });
        };
        if msg.status != MessageStatus::Pending {
            return Ok(MeshOutcome::Error {
                message_id: Some(message_id),
                error: format!("message is {}, not pending", msg.status),
            });
        }

        let Some(to_session) = self.sessions.get(&msg.to_session).await? else {
            return Ok(MeshOutcome::Error {
                message_id: Some(message_id),
                error: "target session not found".to_string(),
            });
        };

        self.deliver(&msg, &to_session.terminal).await
    }

    /// Reject a pending message.
    pub async fn reject(&self, message_id: i64) -> Result<MeshOutcome> {
        let Some(msg) = self.messages.get(message_id).await? else {
            return Ok(MeshOutcome::Error {
                message_id: None,
                error: "message not found".to_string(),
            });
        };
        if msg.status != MessageStatus::Pending {
            return Ok(MeshOutcome::Error {
                message_id: Some(message_id),
                error: format!("message is {}, not pending", msg.status),
            });
        }

        self.messages
            .update_status(message_id, MessageStatus::Rejected, None)
            .await?;
        Ok(MeshOutcome::Blocked {
            reason: "rejected".to_string(),
        })
    }

    /// Type the message into the target pane and mark it delivered.
    async fn deliver(&self, msg: &MessageRecord, terminal: &str) -> Result<MeshOutcome> {
        let from_name = self
            .sessions
            .get(&msg.from_session)
            .await?
            .map(|s| s.agent_name)
            .unwrap_or_else(|| "unknown".to_string());
        let text = format!("[From {from_name}] {}\n", msg.content);

        let result = match parse_handle(terminal) {
            Ok(handle) => self.driver.send_text(&handle, &text).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.messages
                    .update_status(msg.id, MessageStatus::Delivered, Some(&now_iso()))
                    .await?;
                info!(message_id = msg.id, to = %msg.to_session, "mesh message delivered");
                Ok(MeshOutcome::Delivered { message_id: msg.id })
            }
            Err(err) => Ok(MeshOutcome::Error {
                message_id: Some(msg.id),
                error: err.to_string(),
            }),
        }
    }
}
