//! Context variable and preference persistence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

/// A shared variable under a scope (`global` by default).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContextVariable {
    pub key: String,
    pub scope: String,
    pub value: String,
    pub updated_by: String,
    pub updated_at: String,
}

/// Repository for scoped context variables.
#[derive(Clone)]
pub struct ContextRepository {
    pool: SqlitePool,
}

impl ContextRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        scope: &str,
        updated_by: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO context (key, scope, value, updated_by)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key, scope) DO UPDATE SET
                value      = excluded.value,
                updated_by = excluded.updated_by,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
            "#,
        )
        .bind(key)
        .bind(scope)
        .bind(value)
        .bind(updated_by)
        .execute(&self.pool)
        .await
        .context("setting context variable")?;

        Ok(())
    }

    pub async fn get(&self, key: &str, scope: &str) -> Result<Option<ContextVariable>> {
        let var = sqlx::query_as::<_, ContextVariable>(
            "SELECT * FROM context WHERE key = ? AND scope = ?",
        )
        .bind(key)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .context("fetching context variable")?;

        Ok(var)
    }

    pub async fn list(&self, scope: Option<&str>) -> Result<Vec<ContextVariable>> {
        let vars = match scope {
            Some(scope) => {
                sqlx::query_as::<_, ContextVariable>(
                    "SELECT * FROM context WHERE scope = ? ORDER BY key",
                )
                .bind(scope)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ContextVariable>("SELECT * FROM context ORDER BY scope, key")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("listing context variables")?;

        Ok(vars)
    }

    pub async fn delete(&self, key: &str, scope: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM context WHERE key = ? AND scope = ?")
            .bind(key)
            .bind(scope)
            .execute(&self.pool)
            .await
            .context("deleting context variable")?;

        Ok(result.rows_affected() > 0)
    }
}

/// Repository for flat key/value daemon preferences.
#[derive(Clone)]
pub struct PreferenceRepository {
    pool: SqlitePool,
}

impl PreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("setting preference")?;

        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("fetching preference")?;

        Ok(value)
    }

    pub async fn list(&self) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM preferences ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing preferences")?;

        Ok(rows.into_iter().collect())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("deleting preference")?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn context_is_scoped() {
        let db = Database::in_memory().await.unwrap();
        let repo = ContextRepository::new(db.pool().clone());

        repo.set("branch", "main", "global", "s1").await.unwrap();
        repo.set("branch", "feature", "team-a", "s2").await.unwrap();

        let global = repo.get("branch", "global").await.unwrap().unwrap();
        assert_eq!(global.value, "main");

        let scoped = repo.list(Some("team-a")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].value, "feature");

        assert!(repo.delete("branch", "team-a").await.unwrap());
        assert!(!repo.delete("branch", "team-a").await.unwrap());
    }

    #[tokio::test]
    async fn context_upsert_overwrites_and_tracks_author() {
        let db = Database::in_memory().await.unwrap();
        let repo = ContextRepository::new(db.pool().clone());

        repo.set("k", "v1", "global", "s1").await.unwrap();
        repo.set("k", "v2", "global", "s2").await.unwrap();

        let var = repo.get("k", "global").await.unwrap().unwrap();
        assert_eq!(var.value, "v2");
        assert_eq!(var.updated_by, "s2");
        assert_eq!(repo.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let repo = PreferenceRepository::new(db.pool().clone());

        repo.set("theme", "dark").await.unwrap();
        repo.set("theme", "light").await.unwrap();
        repo.set("sound", "off").await.unwrap();

        assert_eq!(repo.get("theme").await.unwrap().as_deref(), Some("light"));

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("sound").map(String::as_str), Some("off"));

        assert!(repo.delete("sound").await.unwrap());
        assert!(!repo.delete("sound").await.unwrap());
    }
}
