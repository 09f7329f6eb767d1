//! Countdown tick engine background task

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::engine::TimerService;

/// Default tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickEngineError {
    #[error("tick engine is already running")]
    AlreadyRunning,
}

/// Counters for one pass over the active timers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub examined: usize,
    pub decremented: usize,
    pub failed: usize,
}

/// Run one tick: decrement every running timer by one, persisting,
/// snapshotting and broadcasting each. A failure on one timer is logged and
/// that timer skipped; the others are still processed.
pub async fn tick_once(service: &TimerService) -> TickReport {
    let mut report = TickReport::default();

    let timers = match service.list().await {
        Ok(timers) => timers,
        Err(e) => {
            error!(error = %e, "Failed to load active timers, skipping tick");
            return report;
        }
    };

    for mut timer in timers {
        report.examined += 1;
        if !timer.tick() {
            continue;
        }
        match service.commit(&timer).await {
            Ok(()) => report.decremented += 1,
            Err(e) => {
                warn!(id = timer.id, error = %e, "Failed to persist tick, skipping timer");
                report.failed += 1;
            }
        }
    }
    report
}

/// Owns the single countdown loop
pub struct TickEngine {
    service: Arc<TimerService>,
    period: Duration,
    running: Arc<AtomicBool>,
}

impl TickEngine {
    pub fn new(service: Arc<TimerService>, period: Duration) -> Self {
        Self {
            service,
            period,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the loop. Fails if a loop started by this engine is still running.
    pub fn start(&self) -> Result<TickHandle, TickEngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TickEngineError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let service = Arc::clone(&self.service);
        let running = Arc::clone(&self.running);
        let period = self.period;

        let task = tokio::spawn(async move {
            run_loop(service, period, stop_rx).await;
            running.store(false, Ordering::SeqCst);
        });

        Ok(TickHandle { stop_tx, task })
    }
}

async fn run_loop(service: Arc<TimerService>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    info!(period_ms = period.as_millis() as u64, "Starting tick engine");

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = tick_once(&service).await;
                debug!(
                    examined = report.examined,
                    decremented = report.decremented,
                    failed = report.failed,
                    "Tick complete"
                );
            }
            changed = stop_rx.changed() => {
                // A dropped handle also ends the loop.
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Tick engine stopped");
}

/// Control handle for a running loop.
///
/// `stop` may be called any number of times; dropping the handle stops the
/// loop as well.
pub struct TickHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickHandle {
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow() || self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Tick engine task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::service::tests::fixture,
        error::{Result, TimerError},
        realtime::{Broadcaster, ConnectionRegistry, Role},
        services::{SqliteSnapshotCache, SqliteTimerRepository, TimerRepository, DEFAULT_SNAPSHOT_TTL},
        state::{ServerMessage, Timer, TimerId},
    };

    #[tokio::test]
    async fn one_tick_decrements_running_timers_only() {
        let fx = fixture();
        let running = fx.service.create("s1", 10).await.unwrap();
        let paused = fx.service.create("s2", 10).await.unwrap();
        fx.service.pause(paused.id).await.unwrap();
        let finished = fx.service.create("s3", 0).await.unwrap();

        let report = tick_once(&fx.service).await;

        assert_eq!(report, TickReport { examined: 3, decremented: 1, failed: 0 });
        assert_eq!(fx.repo.find_by_id(running.id).unwrap().current_time, 9);
        assert_eq!(fx.repo.find_by_id(paused.id).unwrap().current_time, 10);
        assert_eq!(fx.repo.find_by_id(finished.id).unwrap().current_time, 0);
    }

    #[tokio::test]
    async fn countdown_never_goes_negative() {
        let fx = fixture();
        let timer = fx.service.create("s1", 2).await.unwrap();
        for _ in 0..5 {
            tick_once(&fx.service).await;
        }
        let row = fx.repo.find_by_id(timer.id).unwrap();
        assert_eq!(row.current_time, 0);
        assert!(!row.is_paused);
    }

    #[tokio::test]
    async fn five_ticks_reach_owner_and_every_supervisor() {
        let fx = fixture();
        let (_g1, mut owner) = fx.registry.register("s1", Role::Owner);
        let (_g2, mut sup_a) = fx.registry.register("ops-a", Role::Supervisor);
        let (_g3, mut sup_b) = fx.registry.register("ops-b", Role::Supervisor);
        let (_g4, mut stranger) = fx.registry.register("s2", Role::Owner);

        let timer = fx.service.create("s1", 60).await.unwrap();
        for rx in [&mut owner, &mut sup_a, &mut sup_b] {
            assert_eq!(rx.try_recv().unwrap(), ServerMessage::TimerUpdate(timer.clone()));
        }

        for _ in 0..5 {
            tick_once(&fx.service).await;
        }

        let row = fx.repo.find_by_id(timer.id).unwrap();
        assert_eq!(row.current_time, 55);
        assert!(!row.is_paused);

        for rx in [&mut owner, &mut sup_a, &mut sup_b] {
            for expected in (55..60).rev() {
                match rx.try_recv().unwrap() {
                    ServerMessage::TimerUpdate(t) => {
                        assert_eq!(t.id, timer.id);
                        assert_eq!(t.current_time, expected);
                    }
                    other => panic!("unexpected message {:?}", other),
                }
            }
            assert!(rx.try_recv().is_err());
        }
        assert!(stranger.try_recv().is_err());
    }

    #[tokio::test]
    async fn pause_freezes_countdown_between_ticks() {
        let fx = fixture();
        let timer = fx.service.create("s1", 30).await.unwrap();

        fx.service.pause(timer.id).await.unwrap();
        for _ in 0..3 {
            tick_once(&fx.service).await;
        }
        fx.service.resume(timer.id).await.unwrap();
        for _ in 0..2 {
            tick_once(&fx.service).await;
        }

        assert_eq!(fx.repo.find_by_id(timer.id).unwrap().current_time, 28);
    }

    /// Store whose updates fail for one id
    struct FailingUpdates {
        inner: SqliteTimerRepository,
        poisoned: TimerId,
    }

    impl TimerRepository for FailingUpdates {
        fn create(&self, session_id: &str, max_time: u64) -> Result<Timer> {
            self.inner.create(session_id, max_time)
        }

        fn find_by_id(&self, id: TimerId) -> Result<Timer> {
            self.inner.find_by_id(id)
        }

        fn update(&self, timer: &Timer) -> Result<()> {
            if timer.id == self.poisoned {
                return Err(TimerError::persistence("disk full"));
            }
            self.inner.update(timer)
        }

        fn delete(&self, id: TimerId) -> Result<()> {
            self.inner.delete(id)
        }

        fn find_active(&self) -> Result<Vec<Timer>> {
            self.inner.find_active()
        }
    }

    #[tokio::test]
    async fn failing_timer_does_not_block_others() {
        let inner = SqliteTimerRepository::in_memory().unwrap();
        let bad = inner.create("bad", 10).unwrap();
        let good = inner.create("good", 10).unwrap();
        let repo = Arc::new(FailingUpdates {
            inner: inner.clone(),
            poisoned: bad.id,
        });
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (_guard, mut bad_owner) = registry.register("bad", Role::Owner);
        let service = TimerService::new(
            repo,
            Arc::new(SqliteSnapshotCache::in_memory().unwrap()),
            Broadcaster::new(registry, Duration::from_millis(50)),
            DEFAULT_SNAPSHOT_TTL,
        );

        let report = tick_once(&service).await;

        assert_eq!(report, TickReport { examined: 2, decremented: 1, failed: 1 });
        assert_eq!(inner.find_by_id(bad.id).unwrap().current_time, 10);
        assert_eq!(inner.find_by_id(good.id).unwrap().current_time, 9);
        assert!(bad_owner.try_recv().is_err());
    }

    #[tokio::test]
    async fn loop_ticks_until_stopped() {
        let fx = fixture();
        let timer = fx.service.create("s1", 1_000).await.unwrap();
        let engine = TickEngine::new(Arc::clone(&fx.service), Duration::from_millis(10));

        let handle = engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.start().err(), Some(TickEngineError::AlreadyRunning));

        let mut ticked = false;
        for _ in 0..200 {
            if fx.repo.find_by_id(timer.id).unwrap().current_time < 1_000 {
                ticked = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ticked, "loop never decremented the timer");

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        handle.shutdown().await;
        assert!(!engine.is_running());

        let frozen = fx.repo.find_by_id(timer.id).unwrap().current_time;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fx.repo.find_by_id(timer.id).unwrap().current_time, frozen);

        // A stopped engine may be started again.
        engine.start().unwrap().shutdown().await;
    }
}
