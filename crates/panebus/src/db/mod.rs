//! The daemon's store: one SQLite file holding events, sessions, messages,
//! rules, tasks, context, and preferences.
//!
//! Writes are small single-statement transactions (an event insert, a
//! session upsert) issued from concurrent HTTP handlers while the monitor
//! reads stale-session scans in the background. WAL mode keeps those
//! readers off the writer's back, and the busy timeout covers the rare
//! moment two upserts collide on the single writer.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Enough for the handler fan-in plus the monitor; SQLite still serializes
/// the writes underneath.
const POOL_SIZE: u32 = 5;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the daemon's SQLite store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the store at `path`, creating the file and any missing parent
    /// directories, then bring the schema up to date.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        Self::connect(options, POOL_SIZE).await
    }

    /// A throwaway in-memory store for tests. Capped at one connection so
    /// the database lives exactly as long as the pool.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::new().in_memory(true), 1).await
    }

    async fn connect(options: SqliteConnectOptions, pool_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await
            .context("opening sqlite pool")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("applying schema migrations")?;

        Ok(Self { pool })
    }

    /// The underlying pool, for repositories to clone.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current UTC time in the ISO-8601 millisecond format the schema uses.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
