//! Task persistence and DAG-aware scheduling.

use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;

use super::models::{CreateTask, Task, TaskPatch, TaskRow, TaskStatus};

/// Repository for the task DAG.
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, task: &CreateTask) -> Result<i64> {
        let deps = serde_json::to_string(&task.dependencies).context("encoding dependencies")?;
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (session_id, title, description, status, priority, dependencies)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.session_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.to_string())
        .bind(task.priority.to_string())
        .bind(deps)
        .execute(&self.pool)
        .await
        .context("inserting task")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching task by id")?;

        Ok(row.map(Task::from))
    }

    /// List tasks ordered by priority (high, medium, low) then id.
    pub async fn list(
        &self,
        session_id: Option<&str>,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Task>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks");
        let mut first = true;
        let mut clause = |builder: &mut QueryBuilder<Sqlite>| {
            builder.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if let Some(session_id) = session_id {
            clause(&mut builder);
            builder
                .push("session_id = ")
                .push_bind(session_id.to_string());
        }
        if let Some(status) = status {
            clause(&mut builder);
            builder.push("status = ").push_bind(status.to_string());
        }

        builder
            .push(
                " ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, id ASC LIMIT ",
            )
            .push_bind(limit.clamp(1, 1000));

        let rows = builder
            .build_query_as::<TaskRow>()
            .fetch_all(&self.pool)
            .await
            .context("listing tasks")?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    /// Patch a task. Returns false when the id is unknown.
    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<bool> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE tasks SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')",
        );

        if let Some(title) = &patch.title {
            builder.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &patch.description {
            builder.push(", description = ").push_bind(description.clone());
        }
        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status.to_string());
        }
        if let Some(priority) = patch.priority {
            builder.push(", priority = ").push_bind(priority.to_string());
        }
        if let Some(session_id) = &patch.session_id {
            builder.push(", session_id = ").push_bind(session_id.clone());
        }
        if let Some(dependencies) = &patch.dependencies {
            let deps = serde_json::to_string(dependencies).context("encoding dependencies")?;
            builder.push(", dependencies = ").push_bind(deps);
        }

        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("updating task")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting task")?;

        Ok(result.rows_affected() > 0)
    }

    /// The next actionable task: `pending`, with every dependency `done`.
    ///
    /// Dependency closure is computed against all tasks across sessions, so
    /// a filtered candidate may depend on another session's work.
    pub async fn next_task(&self, session_id: Option<&str>) -> Result<Option<Task>> {
        let all = self.list(None, None, 1000).await?;
        let done_ids: HashSet<i64> = all
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id)
            .collect();

        let candidates = self.list(session_id, None, 500).await?;
        Ok(candidates.into_iter().find(|t| {
            t.status == TaskStatus::Pending && t.dependencies.iter().all(|d| done_ids.contains(d))
        }))
    }

    /// Atomically claim a task for a session, moving it to `in_progress`.
    pub async fn claim(&self, id: i64, session_id: &str) -> Result<bool> {
        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        self.update(id, &patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::tasks::TaskPriority;

    async fn setup() -> (Database, TaskRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = TaskRepository::new(db.pool().clone());
        (db, repo)
    }

    fn task(title: &str, priority: TaskPriority, deps: Vec<i64>) -> CreateTask {
        CreateTask {
            session_id: String::new(),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority,
            dependencies: deps,
        }
    }

    #[tokio::test]
    async fn dependencies_round_trip() {
        let (_db, repo) = setup().await;
        let id = repo
            .insert(&task("t", TaskPriority::Medium, vec![3, 5]))
            .await
            .unwrap();
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.dependencies, vec![3, 5]);
    }

    #[tokio::test]
    async fn next_task_respects_dependencies() {
        let (_db, repo) = setup().await;

        let t1 = repo.insert(&task("first", TaskPriority::Medium, vec![])).await.unwrap();
        let t2 = repo.insert(&task("second", TaskPriority::Medium, vec![t1])).await.unwrap();

        let next = repo.next_task(None).await.unwrap().unwrap();
        assert_eq!(next.id, t1);

        repo.update(
            t1,
            &TaskPatch {
                status: Some(TaskStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let next = repo.next_task(None).await.unwrap().unwrap();
        assert_eq!(next.id, t2);
    }

    #[tokio::test]
    async fn next_task_prefers_high_priority() {
        let (_db, repo) = setup().await;

        repo.insert(&task("low", TaskPriority::Low, vec![])).await.unwrap();
        let high = repo.insert(&task("high", TaskPriority::High, vec![])).await.unwrap();
        repo.insert(&task("medium", TaskPriority::Medium, vec![])).await.unwrap();

        let next = repo.next_task(None).await.unwrap().unwrap();
        assert_eq!(next.id, high);
    }

    #[tokio::test]
    async fn unmet_dependency_blocks_everything() {
        let (_db, repo) = setup().await;

        // Dependency on a task that exists but is only in_progress.
        let t1 = repo.insert(&task("t1", TaskPriority::Medium, vec![])).await.unwrap();
        repo.claim(t1, "s1").await.unwrap();
        repo.insert(&task("t2", TaskPriority::Medium, vec![t1])).await.unwrap();

        assert!(repo.next_task(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cross_session_dependencies_count() {
        let (_db, repo) = setup().await;

        let mut done_elsewhere = task("done", TaskPriority::Medium, vec![]);
        done_elsewhere.session_id = "other".to_string();
        done_elsewhere.status = TaskStatus::Done;
        let dep = repo.insert(&done_elsewhere).await.unwrap();

        let mut mine = task("mine", TaskPriority::Medium, vec![dep]);
        mine.session_id = "s1".to_string();
        let mine_id = repo.insert(&mine).await.unwrap();

        let next = repo.next_task(Some("s1")).await.unwrap().unwrap();
        assert_eq!(next.id, mine_id);
    }

    #[tokio::test]
    async fn claim_assigns_and_starts() {
        let (_db, repo) = setup().await;
        let id = repo.insert(&task("t", TaskPriority::Medium, vec![])).await.unwrap();

        assert!(repo.claim(id, "s1").await.unwrap());
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::InProgress);
        assert_eq!(fetched.session_id, "s1");
    }

    #[tokio::test]
    async fn update_missing_task_is_false() {
        let (_db, repo) = setup().await;
        let patch = TaskPatch {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!repo.update(999, &patch).await.unwrap());
    }
}
