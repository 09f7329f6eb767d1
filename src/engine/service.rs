//! Command surface: every timer mutation goes through here
//!
//! A mutation loads the timer, applies the change, writes the durable store,
//! writes the snapshot through to the cache and broadcasts. The steps are not
//! transactional. A cache failure is logged and never fails the command.
//!
//! Concurrent mutations of the same timer are not serialized: a command and a
//! tick racing on one id resolve as last write wins at the store. Callers that
//! need per-timer linearizability should funnel mutations for an id through a
//! single writer (for example a per-id mutex map held around `mutate`).

use std::{sync::Arc, time::Duration};

use tokio::task;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, TimerError},
    realtime::Broadcaster,
    services::{snapshot_key, SnapshotCache, TimerRepository},
    state::{timer::validate_max_time, Timer, TimerId},
};

pub struct TimerService {
    repo: Arc<dyn TimerRepository>,
    cache: Arc<dyn SnapshotCache>,
    broadcaster: Broadcaster,
    snapshot_ttl: Duration,
}

impl TimerService {
    pub fn new(
        repo: Arc<dyn TimerRepository>,
        cache: Arc<dyn SnapshotCache>,
        broadcaster: Broadcaster,
        snapshot_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            broadcaster,
            snapshot_ttl,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Create a running timer at full duration.
    ///
    /// A session id made only of whitespace counts as empty and is rejected,
    /// since it could never match a channel path segment a client would use.
    pub async fn create(&self, session_id: &str, max_time: i64) -> Result<Timer> {
        if session_id.trim().is_empty() {
            return Err(TimerError::validation("sessionId must not be empty"));
        }
        let max_time = validate_max_time(max_time).map_err(TimerError::Validation)?;

        let session = session_id.to_string();
        let timer = self
            .with_repo(move |repo| repo.create(&session, max_time))
            .await
            .inspect_err(|e| error!(session_id, error = %e, "Failed to create timer"))?;

        info!(id = timer.id, session_id, max_time, "Timer created");
        self.write_snapshot(&timer).await;
        self.broadcaster.broadcast_update(&timer).await;
        Ok(timer)
    }

    pub async fn pause(&self, id: TimerId) -> Result<Timer> {
        self.mutate(id, "pause", Timer::pause).await
    }

    pub async fn resume(&self, id: TimerId) -> Result<Timer> {
        self.mutate(id, "resume", Timer::resume).await
    }

    /// Reset both duration and remaining time to `new_max_time`
    pub async fn modify(&self, id: TimerId, new_max_time: i64) -> Result<Timer> {
        let max_time = validate_max_time(new_max_time).map_err(TimerError::Validation)?;
        self.mutate(id, "modify", move |timer| timer.reset(max_time))
            .await
    }

    /// Delete the timer, invalidate its snapshot and notify observers.
    /// Returns the timer as it was just before deletion.
    pub async fn stop(&self, id: TimerId) -> Result<Timer> {
        let timer = self.get(id).await?;
        self.with_repo(move |repo| repo.delete(id))
            .await
            .inspect_err(|e| error!(id, error = %e, "Failed to stop timer"))?;

        info!(id, session_id = %timer.session_id, "Timer stopped");
        self.invalidate_snapshot(&timer).await;
        self.broadcaster
            .broadcast_stop(timer.id, &timer.session_id)
            .await;
        Ok(timer)
    }

    pub async fn get(&self, id: TimerId) -> Result<Timer> {
        self.with_repo(move |repo| repo.find_by_id(id)).await
    }

    /// All non-deleted timers
    pub async fn list(&self) -> Result<Vec<Timer>> {
        self.with_repo(|repo| repo.find_active()).await
    }

    async fn mutate<F>(&self, id: TimerId, action: &'static str, apply: F) -> Result<Timer>
    where
        F: FnOnce(&mut Timer),
    {
        let mut timer = self
            .get(id)
            .await
            .inspect_err(|e| warn!(id, action, error = %e, "Failed to load timer"))?;
        apply(&mut timer);
        self.commit(&timer)
            .await
            .inspect_err(|e| error!(id, action, error = %e, "Failed to persist timer"))?;
        info!(
            id,
            action,
            current_time = timer.current_time,
            max_time = timer.max_time,
            is_paused = timer.is_paused,
            "Timer updated"
        );
        Ok(timer)
    }

    /// Durable write, then cache write-through, then broadcast
    pub(crate) async fn commit(&self, timer: &Timer) -> Result<()> {
        let row = timer.clone();
        self.with_repo(move |repo| repo.update(&row)).await?;
        self.write_snapshot(timer).await;
        self.broadcaster.broadcast_update(timer).await;
        Ok(())
    }

    /// Overwrite only the countdown fields of an existing row, without
    /// touching the cache or observers
    pub(crate) async fn reconcile(&self, snapshot: Timer) -> Result<Timer> {
        self.with_repo(move |repo| {
            let mut row = repo.find_by_id(snapshot.id)?;
            if row.session_id != snapshot.session_id {
                return Err(TimerError::validation(format!(
                    "snapshot session {:?} does not match stored session {:?}",
                    snapshot.session_id, row.session_id
                )));
            }
            row.current_time = snapshot.current_time.min(row.max_time);
            row.is_paused = snapshot.is_paused;
            repo.update(&row)?;
            Ok(row)
        })
        .await
    }

    pub(crate) async fn snapshot_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_cache(move |cache| cache.keys(&prefix)).await
    }

    pub(crate) async fn read_snapshot(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_cache(move |cache| cache.get(&key)).await
    }

    async fn write_snapshot(&self, timer: &Timer) {
        let value = match serde_json::to_string(timer) {
            Ok(value) => value,
            Err(e) => {
                error!(id = timer.id, error = %e, "Failed to serialize timer snapshot");
                return;
            }
        };
        let key = snapshot_key(&timer.session_id);
        let ttl = self.snapshot_ttl;
        match self
            .with_cache(move |cache| cache.set(&key, &value, ttl))
            .await
        {
            Ok(()) => debug!(id = timer.id, "Snapshot written"),
            Err(e) => warn!(id = timer.id, error = %e, "Failed to write timer snapshot"),
        }
    }

    /// Remove the session's snapshot if it belongs to this timer, so a
    /// sibling timer's snapshot in the same session is left alone
    async fn invalidate_snapshot(&self, timer: &Timer) {
        let key = snapshot_key(&timer.session_id);
        let id = timer.id;
        let outcome = self
            .with_cache(move |cache| {
                let owned_by_timer = cache
                    .get(&key)?
                    .and_then(|raw| serde_json::from_str::<Timer>(&raw).ok())
                    .is_some_and(|snapshot| snapshot.id == id);
                if owned_by_timer {
                    cache.delete(&key)
                } else {
                    Ok(false)
                }
            })
            .await;
        match outcome {
            Ok(removed) => debug!(id, removed, "Snapshot invalidated"),
            Err(e) => warn!(id, error = %e, "Failed to invalidate timer snapshot"),
        }
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TimerRepository) -> Result<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .map_err(|e| TimerError::persistence(format!("store task failed: {}", e)))?
    }

    async fn with_cache<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SnapshotCache) -> Result<T> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        task::spawn_blocking(move || f(cache.as_ref()))
            .await
            .map_err(|e| TimerError::persistence(format!("cache task failed: {}", e)))?
    }
}
