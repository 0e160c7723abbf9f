//! Event persistence.

use anyhow::{Context, Result};
use panebus_protocol::AgentEvent;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{EventFilter, EventRecord};

/// Repository for the append-only event log.
#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event. Events are never updated.
    pub async fn insert(&self, event: &AgentEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (
                agent_name, session_id, parent_session_id, category,
                title, message, project_cwd, git_branch, terminal, work_summary
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.agent_name)
        .bind(&event.session_id)
        .bind(&event.parent_session_id)
        .bind(&event.category)
        .bind(&event.title)
        .bind(&event.message)
        .bind(&event.project_cwd)
        .bind(&event.git_branch)
        .bind(event.terminal_json())
        .bind(&event.work_summary)
        .execute(&self.pool)
        .await
        .context("inserting event")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<Option<EventRecord>> {
        let record = sqlx::query_as::<_, EventRecord>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching event by id")?;

        Ok(record)
    }

    /// List events newest-first with optional filters.
    pub async fn list(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM events");
        let mut first = true;
        let mut clause = |builder: &mut QueryBuilder<Sqlite>| {
            builder.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if let Some(agent) = &filter.agent {
            clause(&mut builder);
            builder.push("agent_name = ").push_bind(agent.clone());
        }
        if let Some(category) = &filter.category {
            clause(&mut builder);
            builder.push("category = ").push_bind(category.clone());
        }
        if let Some(project) = &filter.project {
            clause(&mut builder);
            builder
                .push("project_cwd LIKE ")
                .push_bind(format!("%{project}%"));
        }
        if let Some(since) = &filter.since {
            clause(&mut builder);
            builder.push("created_at >= ").push_bind(since.clone());
        }

        builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(filter.clamped_limit());

        let records = builder
            .build_query_as::<EventRecord>()
            .fetch_all(&self.pool)
            .await
            .context("listing events")?;

        Ok(records)
    }

    /// Events for one session, newest-first.
    pub async fn for_session(&self, session_id: &str, limit: i64) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM events WHERE session_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await
        .context("listing session events")?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, EventRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = EventRepository::new(db.pool().clone());
        (db, repo)
    }

    fn make_event(agent: &str, session: &str, category: &str) -> AgentEvent {
        AgentEvent {
            agent_name: agent.to_string(),
            session_id: session.to_string(),
            category: category.to_string(),
            title: format!("{agent}: test"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let (_db, repo) = setup().await;

        let id = repo
            .insert(&make_event("Claude", "s1", "completion"))
            .await
            .unwrap();
        assert!(id > 0);

        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.agent_name, "Claude");
        assert_eq!(fetched.terminal, "{}");
        assert!(fetched.created_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn list_filters_by_agent_and_category() {
        let (_db, repo) = setup().await;

        repo.insert(&make_event("Claude", "s1", "completion"))
            .await
            .unwrap();
        repo.insert(&make_event("Codex", "s2", "error")).await.unwrap();
        repo.insert(&make_event("Claude", "s1", "error")).await.unwrap();

        let filter = EventFilter {
            agent: Some("Claude".to_string()),
            category: Some("error".to_string()),
            ..Default::default()
        };
        let events = repo.list(&filter).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, "s1");
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let (_db, repo) = setup().await;

        for i in 0..5 {
            repo.insert(&make_event("Claude", &format!("s{i}"), "completion"))
                .await
                .unwrap();
        }

        let filter = EventFilter {
            limit: 2,
            ..Default::default()
        };
        let events = repo.list(&filter).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id > events[1].id);
    }

    #[tokio::test]
    async fn project_filter_is_substring_match() {
        let (_db, repo) = setup().await;

        let mut event = make_event("Claude", "s1", "completion");
        event.project_cwd = "/home/dev/widgets".to_string();
        repo.insert(&event).await.unwrap();

        let filter = EventFilter {
            project: Some("widg".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);

        let filter = EventFilter {
            project: Some("gadgets".to_string()),
            ..Default::default()
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
    }
}
