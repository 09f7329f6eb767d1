//! Snapshot cache: a key-value store with per-entry expiry
//!
//! Used as a write-through accelerator and as the recovery source for the
//! startup restore. It is never authoritative.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, TimerError};

/// Prefix shared by every timer snapshot key
pub const SNAPSHOT_KEY_PREFIX: &str = "timer:";

/// Default snapshot lifetime
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for the snapshot of a session's timer
pub fn snapshot_key(session_id: &str) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{session_id}")
}

/// Key-value store with per-entry expiry. Expired entries are invisible to
/// `get` and `keys`.
pub trait SnapshotCache: Send + Sync {
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns whether a live entry was removed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Live keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  expires_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_expiry ON snapshots(expires_at_ms);
"#;

/// Snapshot cache kept in its own SQLite file so it outlives the process
#[derive(Clone)]
pub struct SqliteSnapshotCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| TimerError::persistence(format!("open {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Opened snapshot cache");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| TimerError::persistence(format!("init snapshot schema: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TimerError::persistence("snapshot cache lock poisoned"))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE expires_at_ms <= ?1",
            params![now_ms()],
        )?;
        if removed > 0 {
            debug!(removed, "Purged expired snapshots");
        }
        Ok(removed)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SnapshotCache for SqliteSnapshotCache {
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms().saturating_add(ttl_ms);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshots (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at_ms = excluded.expires_at_ms",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM snapshots WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, now_ms()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE key = ?1 AND expires_at_ms > ?2",
            params![key, now_ms()],
        )?;
        Ok(removed > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.purge_expired()?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM snapshots
              WHERE substr(key, 1, length(?1)) = ?1 AND expires_at_ms > ?2
              ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix, now_ms()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}
