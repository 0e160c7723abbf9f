//! Session persistence.
//!
//! Upserts are monotonic: non-empty incoming fields overwrite, empty ones
//! preserve what is already there, and `event_count` goes up by one per
//! upsert. `ended_at` is stamped only on the transition to `ended`.

use anyhow::{Context, Result};
use panebus_protocol::AgentEvent;
use sqlx::SqlitePool;

use super::models::{AgentSession, SessionStatus};

/// Repository for the agent session registry.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fold an event into the session row. Events without a session id are
    /// not tracked.
    pub async fn upsert_from_event(&self, event: &AgentEvent) -> Result<()> {
        if event.session_id.is_empty() {
            return Ok(());
        }

        let status = SessionStatus::from_category(event.parsed_category()).to_string();
        let terminal = event.terminal_json();

        sqlx::query(
            r#"
            INSERT INTO agent_sessions
                (session_id, parent_session_id, agent_name, project_cwd,
                 git_branch, terminal, status, last_event, event_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(session_id) DO UPDATE SET
                agent_name        = excluded.agent_name,
                parent_session_id = CASE WHEN excluded.parent_session_id != ''
                                         THEN excluded.parent_session_id
                                         ELSE agent_sessions.parent_session_id END,
                project_cwd       = CASE WHEN excluded.project_cwd != ''
                                         THEN excluded.project_cwd
                                         ELSE agent_sessions.project_cwd END,
                git_branch        = CASE WHEN excluded.git_branch != ''
                                         THEN excluded.git_branch
                                         ELSE agent_sessions.git_branch END,
                terminal          = CASE WHEN excluded.terminal != '{}'
                                         THEN excluded.terminal
                                         ELSE agent_sessions.terminal END,
                status            = ?,
                last_event        = excluded.last_event,
                last_seen         = strftime('%Y-%m-%dT%H:%M:%fZ','now'),
                ended_at          = CASE WHEN ? = 'ended'
                                         THEN strftime('%Y-%m-%dT%H:%M:%fZ','now')
                                         ELSE agent_sessions.ended_at END,
                event_count       = agent_sessions.event_count + 1
            "#,
        )
        .bind(&event.session_id)
        .bind(&event.parent_session_id)
        .bind(&event.agent_name)
        .bind(&event.project_cwd)
        .bind(&event.git_branch)
        .bind(&terminal)
        .bind(&status)
        .bind(&event.category)
        .bind(&status)
        .bind(&status)
        .execute(&self.pool)
        .await
        .context("upserting agent session")?;

        Ok(())
    }

    /// Bump `last_heartbeat` and `last_seen`. Returns false when the session
    /// is unknown.
    pub async fn heartbeat(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE agent_sessions
            SET last_heartbeat = strftime('%Y-%m-%dT%H:%M:%fZ','now'),
                last_seen      = strftime('%Y-%m-%dT%H:%M:%fZ','now')
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("recording heartbeat")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<AgentSession>> {
        let session =
            sqlx::query_as::<_, AgentSession>("SELECT * FROM agent_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .context("fetching session by id")?;

        Ok(session)
    }

    /// List sessions, most recently seen first.
    pub async fn list(&self, status: Option<&str>) -> Result<Vec<AgentSession>> {
        let sessions = match status {
            Some(status) => {
                sqlx::query_as::<_, AgentSession>(
                    "SELECT * FROM agent_sessions WHERE status = ? ORDER BY last_seen DESC",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, AgentSession>(
                    "SELECT * FROM agent_sessions ORDER BY last_seen DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("listing sessions")?;

        Ok(sessions)
    }

    /// Sub-agent sessions for a parent, oldest first.
    pub async fn children(&self, parent_session_id: &str) -> Result<Vec<AgentSession>> {
        let sessions = sqlx::query_as::<_, AgentSession>(
            "SELECT * FROM agent_sessions WHERE parent_session_id = ? ORDER BY first_seen",
        )
        .bind(parent_session_id)
        .fetch_all(&self.pool)
        .await
        .context("listing child sessions")?;

        Ok(sessions)
    }

    /// Sessions that should be producing output but have been quiet for more
    /// than `seconds`. The heartbeat timestamp takes precedence over
    /// `last_seen` when one has ever been recorded.
    pub async fn stale(&self, seconds: i64) -> Result<Vec<AgentSession>> {
        let sessions = sqlx::query_as::<_, AgentSession>(
            r#"
            SELECT * FROM agent_sessions
            WHERE status IN ('active', 'waiting')
              AND COALESCE(NULLIF(last_heartbeat, ''), last_seen)
                  < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ? || ' seconds')
            ORDER BY last_seen ASC
            "#,
        )
        .bind(format!("-{seconds}"))
        .fetch_all(&self.pool)
        .await
        .context("scanning for stale sessions")?;

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use panebus_protocol::TerminalHandle;

    async fn setup() -> (Database, SessionRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SessionRepository::new(db.pool().clone());
        (db, repo)
    }

    fn event(session: &str, category: &str) -> AgentEvent {
        AgentEvent {
            agent_name: "Claude".to_string(),
            session_id: session.to_string(),
            category: category.to_string(),
            title: "t".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn status_follows_category_map() {
        let (_db, repo) = setup().await;

        for (category, status) in [
            ("start", SessionStatus::Active),
            ("completion", SessionStatus::Idle),
            ("approval", SessionStatus::Waiting),
            ("question", SessionStatus::Waiting),
            ("error", SessionStatus::Error),
            ("auth", SessionStatus::Active),
            ("stop", SessionStatus::Ended),
        ] {
            repo.upsert_from_event(&event("s1", category)).await.unwrap();
            let session = repo.get("s1").await.unwrap().unwrap();
            assert_eq!(session.status, status, "category {category}");
            assert_eq!(session.last_event, category);
            assert_eq!(
                session.ended_at.is_empty(),
                status != SessionStatus::Ended,
                "ended_at set iff ended, category {category}"
            );
        }
    }

    #[tokio::test]
    async fn upsert_is_monotonic() {
        let (_db, repo) = setup().await;

        let mut first = event("s1", "start");
        first.project_cwd = "/work/project".to_string();
        first.git_branch = "main".to_string();
        first.terminal = Some(TerminalHandle::Tmux {
            tmux_socket: String::new(),
            tmux_pane: "%1".to_string(),
        });
        repo.upsert_from_event(&first).await.unwrap();

        // Empty fields must not clobber existing values.
        repo.upsert_from_event(&event("s1", "completion")).await.unwrap();

        let session = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(session.project_cwd, "/work/project");
        assert_eq!(session.git_branch, "main");
        assert!(session.terminal.contains("%1"));
        assert_eq!(session.event_count, 2);

        // Non-empty fields overwrite.
        let mut third = event("s1", "completion");
        third.git_branch = "feature".to_string();
        repo.upsert_from_event(&third).await.unwrap();

        let session = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(session.git_branch, "feature");
        assert_eq!(session.event_count, 3);
    }

    #[tokio::test]
    async fn events_without_session_id_are_ignored() {
        let (_db, repo) = setup().await;
        repo.upsert_from_event(&event("", "start")).await.unwrap();
        assert!(repo.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_requires_known_session() {
        let (_db, repo) = setup().await;
        assert!(!repo.heartbeat("ghost").await.unwrap());

        repo.upsert_from_event(&event("s1", "start")).await.unwrap();
        assert!(repo.heartbeat("s1").await.unwrap());

        let session = repo.get("s1").await.unwrap().unwrap();
        assert!(!session.last_heartbeat.is_empty());
    }

    #[tokio::test]
    async fn stale_scan_honors_status_and_clock() {
        let (db, repo) = setup().await;

        repo.upsert_from_event(&event("old-active", "start")).await.unwrap();
        repo.upsert_from_event(&event("old-ended", "stop")).await.unwrap();
        repo.upsert_from_event(&event("fresh", "start")).await.unwrap();

        // Backdate two sessions well past every threshold.
        for sid in ["old-active", "old-ended"] {
            sqlx::query("UPDATE agent_sessions SET last_seen = '2020-01-01T00:00:00.000Z' WHERE session_id = ?")
                .bind(sid)
                .execute(db.pool())
                .await
                .unwrap();
        }

        let stale = repo.stale(120).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].session_id, "old-active");
    }

    #[tokio::test]
    async fn heartbeat_takes_precedence_over_last_seen() {
        let (db, repo) = setup().await;

        repo.upsert_from_event(&event("s1", "start")).await.unwrap();
        // Old last_seen but a current heartbeat: not stale.
        repo.heartbeat("s1").await.unwrap();
        sqlx::query(
            "UPDATE agent_sessions SET last_seen = '2020-01-01T00:00:00.000Z' WHERE session_id = 's1'",
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(repo.stale(120).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn children_are_listed_by_first_seen() {
        let (_db, repo) = setup().await;

        let mut child = event("child-1", "start");
        child.parent_session_id = "parent".to_string();
        repo.upsert_from_event(&child).await.unwrap();

        let mut child = event("child-2", "start");
        child.parent_session_id = "parent".to_string();
        repo.upsert_from_event(&child).await.unwrap();

        let children = repo.children("parent").await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].session_id, "child-1");
    }
}
