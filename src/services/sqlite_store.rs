//! SQLite-backed durable timer store

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::repository::TimerRepository;
use crate::{
    error::{Result, TimerError},
    state::{Timer, TimerId},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS timers (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  session_id TEXT NOT NULL,
  max_time INTEGER NOT NULL,
  remaining INTEGER NOT NULL,
  is_paused INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT NULL
);
CREATE INDEX IF NOT EXISTS idx_timers_session ON timers(session_id);
CREATE INDEX IF NOT EXISTS idx_timers_deleted ON timers(deleted_at);
"#;

const SELECT_COLUMNS: &str = "id, session_id, remaining, max_time, is_paused";

#[derive(Clone)]
pub struct SqliteTimerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTimerRepository {
    /// Open (or create) the database at `path`. `:memory:` yields a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| TimerError::persistence(format!("open {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Opened timer database");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| TimerError::persistence(format!("init timer schema: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TimerError::persistence("timer database lock poisoned"))
    }
}

fn to_sql_int(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| TimerError::validation(format!("{} {} is out of range", field, value)))
}

fn timer_from_row(row: &Row<'_>) -> rusqlite::Result<Timer> {
    let id: i64 = row.get(0)?;
    let remaining: i64 = row.get(2)?;
    let max_time: i64 = row.get(3)?;
    Ok(Timer {
        id: id as u64,
        session_id: row.get(1)?,
        current_time: remaining.max(0) as u64,
        max_time: max_time.max(0) as u64,
        is_paused: row.get(4)?,
    })
}

impl TimerRepository for SqliteTimerRepository {
    fn create(&self, session_id: &str, max_time: u64) -> Result<Timer> {
        let max = to_sql_int(max_time, "maxTime")?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO timers (session_id, max_time, remaining, is_paused, created_at, updated_at)
             VALUES (?1, ?2, ?2, 0, ?3, ?3)",
            params![session_id, max, now],
        )?;
        let id = conn.last_insert_rowid() as TimerId;
        debug!(id, session_id, max_time, "Inserted timer row");
        Ok(Timer::new(id, session_id, max_time))
    }

    fn find_by_id(&self, id: TimerId) -> Result<Timer> {
        let key = to_sql_int(id, "id").map_err(|_| TimerError::NotFound(id))?;
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM timers WHERE id = ?1 AND deleted_at IS NULL"),
            params![key],
            timer_from_row,
        )
        .optional()?
        .ok_or(TimerError::NotFound(id))
    }

    fn update(&self, timer: &Timer) -> Result<()> {
        let key = to_sql_int(timer.id, "id").map_err(|_| TimerError::NotFound(timer.id))?;
        let max = to_sql_int(timer.max_time, "maxTime")?;
        let current = to_sql_int(timer.current_time, "currentTime")?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE timers
                SET session_id = ?2, max_time = ?3, remaining = ?4, is_paused = ?5, updated_at = ?6
              WHERE id = ?1 AND deleted_at IS NULL",
            params![
                key,
                timer.session_id,
                max,
                current,
                timer.is_paused,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(TimerError::NotFound(timer.id));
        }
        Ok(())
    }

    fn delete(&self, id: TimerId) -> Result<()> {
        let key = to_sql_int(id, "id").map_err(|_| TimerError::NotFound(id))?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE timers SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![key, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(TimerError::NotFound(id));
        }
        debug!(id, "Soft-deleted timer row");
        Ok(())
    }

    fn find_active(&self) -> Result<Vec<Timer>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM timers WHERE deleted_at IS NULL ORDER BY id"
        ))?;
        let timers = stmt
            .query_map([], timer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(timers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_ids_and_full_duration() {
        let repo = SqliteTimerRepository::in_memory().unwrap();
        let a = repo.create("s1", 60).unwrap();
        let b = repo.create("s1", 30).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.current_time, 60);
        assert!(!a.is_paused);
        assert_eq!(repo.find_by_id(b.id).unwrap(), b);
    }

    #[test]
    fn update_overwrites_mutable_fields() {
        let repo = SqliteTimerRepository::in_memory().unwrap();
        let mut timer = repo.create("s1", 60).unwrap();
        timer.current_time = 12;
        timer.is_paused = true;
        repo.update(&timer).unwrap();

        assert_eq!(repo.find_by_id(timer.id).unwrap(), timer);
    }

    #[test]
    fn deleted_rows_are_invisible() {
        let repo = SqliteTimerRepository::in_memory().unwrap();
        let keep = repo.create("s1", 10).unwrap();
        let gone = repo.create("s2", 10).unwrap();
        repo.delete(gone.id).unwrap();

        assert!(matches!(repo.find_by_id(gone.id), Err(TimerError::NotFound(id)) if id == gone.id));
        assert!(matches!(repo.update(&gone), Err(TimerError::NotFound(_))));
        assert!(matches!(repo.delete(gone.id), Err(TimerError::NotFound(_))));
        assert_eq!(repo.find_active().unwrap(), vec![keep]);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let repo = SqliteTimerRepository::in_memory().unwrap();
        assert!(matches!(repo.find_by_id(99), Err(TimerError::NotFound(99))));
        assert!(matches!(
            repo.update(&Timer::new(99, "s", 1)),
            Err(TimerError::NotFound(99))
        ));
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.db");

        let id = {
            let repo = SqliteTimerRepository::open(&path).unwrap();
            let mut timer = repo.create("s1", 45).unwrap();
            timer.current_time = 40;
            repo.update(&timer).unwrap();
            timer.id
        };

        let reopened = SqliteTimerRepository::open(&path).unwrap();
        let timer = reopened.find_by_id(id).unwrap();
        assert_eq!(timer.current_time, 40);
        assert_eq!(timer.max_time, 45);
    }
}
