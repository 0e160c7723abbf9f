//! Mesh message persistence.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{CreateMessage, MessageRecord, MessageStatus};

/// Repository for mesh messages.
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new message in `pending`.
    pub async fn insert(&self, message: &CreateMessage) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (from_session, to_session, message_type, content, status)
            VALUES (?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(&message.from_session)
        .bind(&message.to_session)
        .bind(&message.message_type)
        .bind(&message.content)
        .execute(&self.pool)
        .await
        .context("inserting message")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<Option<MessageRecord>> {
        let record = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching message by id")?;

        Ok(record)
    }

    /// List messages newest-first, optionally filtered by status.
    pub async fn list(&self, status: Option<&str>, limit: i64) -> Result<Vec<MessageRecord>> {
        let limit = limit.clamp(1, 1000);
        let records = match status {
            Some(status) => {
                sqlx::query_as::<_, MessageRecord>(
                    "SELECT * FROM messages WHERE status = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, MessageRecord>(
                    "SELECT * FROM messages ORDER BY id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("listing messages")?;

        Ok(records)
    }

    /// Transition a message's status, stamping `delivered_at` when given.
    pub async fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        delivered_at: Option<&str>,
    ) -> Result<bool> {
        let result = match delivered_at {
            Some(at) => {
                sqlx::query("UPDATE messages SET status = ?, delivered_at = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(at)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
        }
        .context("updating message status")?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, MessageRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = MessageRepository::new(db.pool().clone());
        (db, repo)
    }

    fn message(from: &str, to: &str) -> CreateMessage {
        CreateMessage {
            from_session: from.to_string(),
            to_session: to.to_string(),
            message_type: "handoff".to_string(),
            content: "payload".to_string(),
        }
    }

    #[tokio::test]
    async fn messages_start_pending() {
        let (_db, repo) = setup().await;
        let id = repo.insert(&message("a", "b")).await.unwrap();
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, MessageStatus::Pending);
        assert!(fetched.delivered_at.is_none());
    }

    #[tokio::test]
    async fn status_filter_and_limit() {
        let (_db, repo) = setup().await;

        let first = repo.insert(&message("a", "b")).await.unwrap();
        repo.insert(&message("a", "c")).await.unwrap();
        repo.update_status(first, MessageStatus::Rejected, None)
            .await
            .unwrap();

        let pending = repo.list(Some("pending"), 50).await.unwrap();
        assert_eq!(pending.len(), 1);

        let all = repo.list(None, 1).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn delivered_at_is_stamped() {
        let (_db, repo) = setup().await;
        let id = repo.insert(&message("a", "b")).await.unwrap();

        repo.update_status(id, MessageStatus::Delivered, Some("2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, MessageStatus::Delivered);
        assert_eq!(fetched.delivered_at.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    }
}
