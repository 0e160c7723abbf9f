//! Rule persistence and matching.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{CreateRule, RuleMatch, RuleRecord};

/// Repository for coordination rules.
#[derive(Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, rule: &CreateRule) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO coordination_rules
                (from_agent, to_agent, event_type, action, priority, template)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.from_agent)
        .bind(&rule.to_agent)
        .bind(&rule.event_type)
        .bind(&rule.action)
        .bind(rule.priority)
        .bind(&rule.template)
        .execute(&self.pool)
        .await
        .context("inserting rule")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self) -> Result<Vec<RuleRecord>> {
        let rules =
            sqlx::query_as::<_, RuleRecord>("SELECT * FROM coordination_rules ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("listing rules")?;

        Ok(rules)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coordination_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting rule")?;

        Ok(result.rows_affected() > 0)
    }

    /// Find the most specific rule for a `(from, to, event)` tuple.
    ///
    /// The eight literal/wildcard combinations are probed most-specific
    /// first; ties within one combination break by `priority DESC`. With no
    /// hit at all, the synthetic `approve` default applies.
    pub async fn match_rule(
        &self,
        from_agent: &str,
        to_agent: &str,
        event_type: &str,
    ) -> Result<RuleMatch> {
        let cascade = [
            (from_agent, to_agent, event_type),
            (from_agent, to_agent, "*"),
            (from_agent, "*", event_type),
            ("*", to_agent, event_type),
            (from_agent, "*", "*"),
            ("*", to_agent, "*"),
            ("*", "*", event_type),
            ("*", "*", "*"),
        ];

        for (fa, ta, et) in cascade {
            let hit = sqlx::query_as::<_, RuleRecord>(
                r#"
                SELECT * FROM coordination_rules
                WHERE from_agent = ? AND to_agent = ? AND event_type = ?
                ORDER BY priority DESC
                LIMIT 1
                "#,
            )
            .bind(fa)
            .bind(ta)
            .bind(et)
            .fetch_optional(&self.pool)
            .await
            .context("matching rule")?;

            if let Some(rule) = hit {
                return Ok(RuleMatch {
                    action: rule.action,
                    template: rule.template,
                    priority: rule.priority,
                });
            }
        }

        Ok(RuleMatch::default())
    }

    /// All rules applicable to an agent's event, highest priority first.
    /// Used by after-work routing, which executes every match.
    pub async fn match_rules_for_event(
        &self,
        agent_name: &str,
        event_type: &str,
    ) -> Result<Vec<RuleRecord>> {
        let rules = sqlx::query_as::<_, RuleRecord>(
            r#"
            SELECT * FROM coordination_rules
            WHERE (from_agent = ? OR from_agent = '*')
              AND (event_type = ? OR event_type = '*')
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(agent_name)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .context("matching rules for event")?;

        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, RuleRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = RuleRepository::new(db.pool().clone());
        (db, repo)
    }

    fn rule(from: &str, to: &str, event: &str, action: &str, priority: i64) -> CreateRule {
        CreateRule {
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            event_type: event.to_string(),
            action: action.to_string(),
            priority,
            template: String::new(),
        }
    }

    #[tokio::test]
    async fn empty_table_yields_approve_default() {
        let (_db, repo) = setup().await;
        let matched = repo.match_rule("a", "b", "handoff").await.unwrap();
        assert_eq!(matched, RuleMatch::default());
    }

    #[tokio::test]
    async fn exact_match_beats_wildcards() {
        let (_db, repo) = setup().await;

        repo.insert(&rule("*", "*", "*", "block", 100)).await.unwrap();
        repo.insert(&rule("a", "b", "handoff", "auto", 0)).await.unwrap();

        let matched = repo.match_rule("a", "b", "handoff").await.unwrap();
        assert_eq!(matched.action, "auto");
    }

    #[tokio::test]
    async fn cascade_order_is_fixed() {
        let (_db, repo) = setup().await;

        // exact/exact/* should beat exact/*/exact.
        repo.insert(&rule("a", "*", "handoff", "block", 0)).await.unwrap();
        repo.insert(&rule("a", "b", "*", "auto", 0)).await.unwrap();

        let matched = repo.match_rule("a", "b", "handoff").await.unwrap();
        assert_eq!(matched.action, "auto");
    }

    #[tokio::test]
    async fn priority_breaks_ties_within_a_bucket() {
        let (_db, repo) = setup().await;

        repo.insert(&rule("a", "b", "handoff", "block", 1)).await.unwrap();
        repo.insert(&rule("a", "b", "handoff", "auto", 5)).await.unwrap();

        let matched = repo.match_rule("a", "b", "handoff").await.unwrap();
        assert_eq!(matched.action, "auto");
        assert_eq!(matched.priority, 5);
    }

    #[tokio::test]
    async fn wildcard_fallback_matches_anything() {
        let (_db, repo) = setup().await;

        repo.insert(&rule("*", "*", "*", "block", 0)).await.unwrap();

        let matched = repo.match_rule("x", "y", "whatever").await.unwrap();
        assert_eq!(matched.action, "block");
    }

    #[tokio::test]
    async fn event_rules_ordered_by_priority_then_id() {
        let (_db, repo) = setup().await;

        repo.insert(&rule("*", "*", "completion", "notify", 0)).await.unwrap();
        repo.insert(&rule("Claude", "*", "*", "next_task", 10)).await.unwrap();
        repo.insert(&rule("*", "*", "*", "spawn", 0)).await.unwrap();
        repo.insert(&rule("Codex", "*", "completion", "handoff", 50)).await.unwrap();

        let rules = repo.match_rules_for_event("Claude", "completion").await.unwrap();
        let actions: Vec<&str> = rules.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["next_task", "notify", "spawn"]);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let (_db, repo) = setup().await;
        let id = repo.insert(&rule("*", "*", "*", "approve", 0)).await.unwrap();
        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());
    }
}
