//! Stall monitor with graduated escalation.
//!
//! Sessions that should be producing output (status `active` or `waiting`)
//! are walked every 30 seconds against three thresholds:
//!
//!   level 1: stale: quiet for 2 minutes, warning
//!   level 2: stuck: quiet for 5 minutes, alert
//!   level 3: dead:  quiet for 15 minutes, critical
//!
//! A session only ever escalates within the loop; any new event or
//! heartbeat clears its level so the next stall re-alerts from level 1.
//! The level map lives in memory only; a daemon restart re-alerts from
//! scratch, which is the safe direction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::bus::EventBus;
use crate::session::{AgentSession, SessionRepository};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// (level, idle threshold in seconds, alert type, severity)
const TIERS: [(u8, i64, &str, &str); 3] = [
    (1, 120, "stale_agent", "warning"),
    (2, 300, "stuck_agent", "alert"),
    (3, 900, "dead_agent", "critical"),
];

/// Background stall detector.
pub struct Monitor {
    sessions: SessionRepository,
    bus: Arc<EventBus>,
    levels: DashMap<String, u8>,
}

impl Monitor {
    pub fn new(sessions: SessionRepository, bus: Arc<EventBus>) -> Self {
        Self {
            sessions,
            bus,
            levels: DashMap::new(),
        }
    }

    /// Start the periodic check loop. Faults are logged, never propagated;
    /// the monitor must not take the daemon down.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately; skip it so a
            // freshly started daemon does not alert on restored sessions.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = monitor.check().await {
                    warn!(%err, "monitor check failed");
                }
            }
        })
    }

    /// One escalation pass over all tiers.
    pub async fn check(&self) -> Result<()> {
        for (level, threshold, alert_type, severity) in TIERS {
            let stale = self.sessions.stale(threshold).await?;
            for session in stale {
                let current = self
                    .levels
                    .get(&session.session_id)
                    .map(|l| *l)
                    .unwrap_or(0);
                // Escalate only; never repeat a level within the loop.
                if current >= level {
                    continue;
                }

                self.levels.insert(session.session_id.clone(), level);
                self.bus.broadcast(&json!({
                    "type": "alert",
                    "alert_type": alert_type,
                    "severity": severity,
                    "level": level,
                    "session_id": session.session_id,
                    "agent_name": session.agent_name,
                    "project_cwd": session.project_cwd,
                    "status": session.status,
                    "last_seen": session.last_seen,
                    "message": alert_message(&session, level),
                }));
            }
        }
        Ok(())
    }

    /// Hysteresis: new activity resets the escalation level.
    pub fn clear_alert(&self, session_id: &str) {
        self.levels.remove(session_id);
    }

    /// Current escalation level for a session (0 when quiet history).
    pub fn level(&self, session_id: &str) -> u8 {
        self.levels.get(session_id).map(|l| *l).unwrap_or(0)
    }
}

fn alert_message(session: &AgentSession, level: u8) -> String {
    let agent = if session.agent_name.is_empty() {
        "Agent"
    } else {
        &session.agent_name
    };
    let project = if session.project_cwd.is_empty() {
        "?"
    } else {
        &session.project_cwd
    };
    match level {
        1 => format!("{agent} in {project} may be stalling (no recent output)"),
        2 => format!("{agent} in {project} appears stuck (no output for 5+ min)"),
        3 => format!("{agent} in {project} appears dead (no output for 15+ min)"),
        _ => format!("{agent} in {project} status unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use panebus_protocol::AgentEvent;
    use serde_json::Value;

    async fn setup() -> (Database, SessionRepository, Arc<EventBus>, Monitor) {
        let db = Database::in_memory().await.unwrap();
        let sessions = SessionRepository::new(db.pool().clone());
        let bus = Arc::new(EventBus::new());
        let monitor = Monitor::new(sessions.clone(), bus.clone());
        (db, sessions, bus, monitor)
    }

    async fn start_session(sessions: &SessionRepository, sid: &str) {
        let event = AgentEvent {
            agent_name: "Claude".to_string(),
            session_id: sid.to_string(),
            category: "start".to_string(),
            title: "t".to_string(),
            project_cwd: "/work".to_string(),
            ..Default::default()
        };
        sessions.upsert_from_event(&event).await.unwrap();
    }

    async fn backdate(db: &Database, sid: &str, seconds_ago: i64) {
        let stamp = (chrono::Utc::now() - chrono::Duration::seconds(seconds_ago))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        sqlx::query("UPDATE agent_sessions SET last_seen = ? WHERE session_id = ?")
            .bind(stamp)
            .bind(sid)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn escalates_one_tier_at_a_time() {
        let (db, sessions, bus, monitor) = setup().await;
        start_session(&sessions, "s1").await;
        backdate(&db, "s1", 200).await;

        let mut rx = bus.subscribe();
        monitor.check().await.unwrap();

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "alert");
        assert_eq!(frame["level"], 1);
        assert_eq!(frame["alert_type"], "stale_agent");
        assert_eq!(monitor.level("s1"), 1);

        // Same staleness, second pass: no repeat of level 1.
        monitor.check().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn deep_stall_runs_through_all_tiers() {
        let (db, sessions, bus, monitor) = setup().await;
        start_session(&sessions, "s1").await;
        backdate(&db, "s1", 1000).await;

        let mut rx = bus.subscribe();
        monitor.check().await.unwrap();

        let levels: Vec<i64> = (0..3)
            .map(|_| {
                let raw = rx.try_recv().unwrap();
                let frame: Value = serde_json::from_str(&raw).unwrap();
                frame["level"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(levels, vec![1, 2, 3]);
        assert_eq!(monitor.level("s1"), 3);
    }

    #[tokio::test]
    async fn hysteresis_resets_to_level_one() {
        let (db, sessions, bus, monitor) = setup().await;
        start_session(&sessions, "s1").await;
        backdate(&db, "s1", 400).await;

        let mut rx = bus.subscribe();
        monitor.check().await.unwrap();
        assert_eq!(monitor.level("s1"), 2);
        // Drain the two escalation frames.
        while rx.try_recv().is_ok() {}

        // New activity clears the level...
        start_session(&sessions, "s1").await;
        monitor.clear_alert("s1");
        assert_eq!(monitor.level("s1"), 0);

        // ...and the next stall re-alerts from level 1, not 2.
        backdate(&db, "s1", 200).await;
        monitor.check().await.unwrap();
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["level"], 1);
    }

    #[tokio::test]
    async fn ended_sessions_never_alert() {
        let (db, sessions, bus, monitor) = setup().await;
        start_session(&sessions, "s1").await;
        let stop = AgentEvent {
            agent_name: "Claude".to_string(),
            session_id: "s1".to_string(),
            category: "stop".to_string(),
            title: "t".to_string(),
            ..Default::default()
        };
        sessions.upsert_from_event(&stop).await.unwrap();
        backdate(&db, "s1", 5000).await;

        let mut rx = bus.subscribe();
        monitor.check().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
