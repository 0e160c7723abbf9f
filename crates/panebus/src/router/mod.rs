//! After-work routing: what happens when an agent completes or stops.
//!
//! Matched rules dispatch to one of five actions:
//!
//!   next_task   assign the next actionable DAG task to the same agent
//!   handoff     forward the work summary to another session's pane
//!   spawn       open a new pane running a fresh agent
//!   notify      broadcast an SSE frame, no terminal action
//!   pipeline    run a JSON array of the above in order
//!
//! Each rule executes independently; one failing action never aborts the
//! batch.

use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use panebus_protocol::AgentEvent;

use crate::mesh::{CreateMessage, MessageRepository, MessageStatus};
use crate::rules::RuleRepository;
use crate::session::SessionRepository;
use crate::tasks::TaskRepository;
use crate::terminal::{PaneDriver, parse_handle};

/// Result of executing one routing rule.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub action: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<RouteResult>>,
}

impl RouteResult {
    fn new(action: &str, status: &str) -> Self {
        Self {
            action: action.to_string(),
            status: status.to_string(),
            task_id: None,
            task_title: None,
            target_session_id: None,
            pane_id: None,
            agent: None,
            message: None,
            error: None,
            steps: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Executes after-work routing rules for completion/stop events.
pub struct AfterWorkRouter {
    sessions: SessionRepository,
    tasks: TaskRepository,
    messages: MessageRepository,
    rules: RuleRepository,
    driver: Arc<dyn PaneDriver>,
}

impl AfterWorkRouter {
    pub fn new(
        sessions: SessionRepository,
        tasks: TaskRepository,
        messages: MessageRepository,
        rules: RuleRepository,
        driver: Arc<dyn PaneDriver>,
    ) -> Self {
        Self {
            sessions,
            tasks,
            messages,
            rules,
            driver,
        }
    }

    /// Run routing for an ingested event. Returns one result per matched
    /// routing rule; non-completion/stop events route nowhere.
    pub async fn route(&self, event: &AgentEvent) -> Result<Vec<RouteResult>> {
        let Some(category) = event.parsed_category() else {
            return Ok(Vec::new());
        };
        if !category.is_after_work() {
            return Ok(Vec::new());
        }

        let rules = self
            .rules
            .match_rules_for_event(&event.agent_name, &event.category)
            .await?;

        let mut results = Vec::new();
        for rule in rules {
            let routing = rule
                .parsed_action()
                .map(|a| a.is_routing())
                .unwrap_or(false);
            if !routing {
                continue;
            }
            let result = self
                .execute(&rule.action, &rule.template, event, &event.session_id)
                .await;
            info!(action = %result.action, status = %result.status, "after-work route executed");
            results.push(result);
        }

        Ok(results)
    }

    /// Execute a single action. Boxed so `pipeline` can recurse.
    fn execute<'a>(
        &'a self,
        action: &'a str,
        template: &'a str,
        event: &'a AgentEvent,
        session_id: &'a str,
    ) -> BoxFuture<'a, RouteResult> {
        Box::pin(async move {
            match action {
                "next_task" => self.route_next_task(session_id).await,
                "handoff" => self.route_handoff(event, template, session_id).await,
                "spawn" => self.route_spawn(event, template).await,
                "notify" => self.route_notify(event, template),
                "pipeline" => self.route_pipeline(event, template, session_id).await,
                other => RouteResult::new(other, "unknown_action"),
            }
        })
    }

    /// Assign the next actionable task to the agent that just finished.
    async fn route_next_task(&self, session_id: &str) -> RouteResult {
        let task = match self.tasks.next_task(Some(session_id)).await {
            Ok(Some(task)) => Some(task),
            // Nothing assigned to this session: fall back to the global pool.
            Ok(None) => match self.tasks.next_task(None).await {
                Ok(task) => task,
                Err(err) => return RouteResult::new("next_task", "failed").with_error(err.to_string()),
            },
            Err(err) => return RouteResult::new("next_task", "failed").with_error(err.to_string()),
        };

        let Some(task) = task else {
            return RouteResult::new("next_task", "no_tasks");
        };

        if let Err(err) = self.tasks.claim(task.id, session_id).await {
            return RouteResult::new("next_task", "failed").with_error(err.to_string());
        }

        if let Ok(Some(session)) = self.sessions.get(session_id).await {
            let mut text = format!("[Next Task #{}] {}", task.id, task.title);
            if !task.description.is_empty() {
                text.push('\n');
                text.push_str(&task.description);
            }
            text.push('\n');
            if let Ok(handle) = parse_handle(&session.terminal) {
                let _ = self.driver.send_text(&handle, &text).await;
            }
        }

        let mut result = RouteResult::new("next_task", "assigned");
        result.task_id = Some(task.id);
        result.task_title = Some(task.title);
        result
    }

    /// Forward the finished agent's summary to another session's pane.
    async fn route_handoff(
        &self,
        event: &AgentEvent,
        template: &str,
        from_session_id: &str,
    ) -> RouteResult {
        let target_session_id = template.trim();
        if target_session_id.is_empty() {
            return RouteResult::new("handoff", "no_target")
                .with_error("template must contain target session_id");
        }

        let target = match self.sessions.get(target_session_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                return RouteResult::new("handoff", "target_not_found")
                    .with_error(format!("session {target_session_id} not found"));
            }
            Err(err) => return RouteResult::new("handoff", "failed").with_error(err.to_string()),
        };

        let agent_name = if event.agent_name.is_empty() {
            "Agent"
        } else {
            &event.agent_name
        };
        let content = [&event.work_summary, &event.message]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "Work completed".to_string());

        let text = format!("[Handoff from {agent_name}] {content}\n");
        let delivered = match parse_handle(&target.terminal) {
            Ok(handle) => self.driver.send_text(&handle, &text).await.is_ok(),
            Err(_) => false,
        };

        // The handoff also lands in the mesh so the dashboard sees it.
        let message = CreateMessage {
            from_session: from_session_id.to_string(),
            to_session: target_session_id.to_string(),
            message_type: "handoff".to_string(),
            content,
        };
        let status = if delivered {
            MessageStatus::Delivered
        } else {
            MessageStatus::Pending
        };
        if let Ok(id) = self.messages.insert(&message).await {
            let delivered_at = delivered.then(crate::db::now_iso);
            let _ = self
                .messages
                .update_status(id, status, delivered_at.as_deref())
                .await;
        }

        let mut result = RouteResult::new("handoff", &status.to_string());
        result.target_session_id = Some(target_session_id.to_string());
        result
    }

    /// Spawn a new agent pane from a JSON template.
    async fn route_spawn(&self, event: &AgentEvent, template: &str) -> RouteResult {
        let config: Value = if template.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(template)
                .unwrap_or_else(|_| serde_json::json!({ "prompt": template }))
        };

        let agent = config
            .get("agent")
            .and_then(Value::as_str)
            .unwrap_or("claude")
            .to_string();
        let mut prompt = config
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let cwd = config
            .get("cwd")
            .and_then(Value::as_str)
            .unwrap_or(&event.project_cwd)
            .to_string();

        if prompt.contains("{summary}") && !event.work_summary.is_empty() {
            prompt = prompt.replace("{summary}", &event.work_summary);
        }

        match self.driver.spawn_pane(&agent, &prompt, &cwd).await {
            Ok(spawned) => {
                let mut result = RouteResult::new("spawn", "spawned");
                result.pane_id = Some(spawned.pane_id);
                result.agent = Some(agent);
                result
            }
            Err(err) => RouteResult::new("spawn", "failed").with_error(err.to_string()),
        }
    }

    /// No terminal action; the result is broadcast over SSE by the caller.
    fn route_notify(&self, event: &AgentEvent, template: &str) -> RouteResult {
        let message = if template.is_empty() {
            let agent = if event.agent_name.is_empty() {
                "Agent"
            } else {
                &event.agent_name
            };
            format!("{agent} finished")
        } else {
            template.to_string()
        };

        let mut result = RouteResult::new("notify", "ok");
        result.message = Some(message);
        result
    }

    /// Run a JSON array of `{action, template}` steps in order, skipping
    /// entries that are not objects.
    async fn route_pipeline(
        &self,
        event: &AgentEvent,
        template: &str,
        session_id: &str,
    ) -> RouteResult {
        let steps: Value = if template.is_empty() {
            Value::Array(Vec::new())
        } else {
            match serde_json::from_str(template) {
                Ok(steps) => steps,
                Err(_) => return RouteResult::new("pipeline", "invalid_template"),
            }
        };
        let Some(steps) = steps.as_array() else {
            return RouteResult::new("pipeline", "invalid_template");
        };

        let mut results = Vec::new();
        for step in steps {
            let Some(step) = step.as_object() else {
                continue;
            };
            let action = step.get("action").and_then(Value::as_str).unwrap_or_default();
            let template = step
                .get("template")
                .and_then(Value::as_str)
                .unwrap_or_default();
            results.push(self.execute(action, template, event, session_id).await);
        }

        let mut result = RouteResult::new("pipeline", "ok");
        result.steps = Some(results);
        result
    }
}
