//! Startup restore of countdown state from the snapshot cache

use serde::Serialize;
use tracing::{info, warn};

use super::service::TimerService;
use crate::{services::SNAPSHOT_KEY_PREFIX, state::Timer};

/// Outcome of one restore pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub scanned: usize,
    pub restored: usize,
    pub skipped: usize,
}

/// Reconcile every cached snapshot into the durable store.
///
/// Must run before the tick engine starts and before channels are accepted.
/// Rows are never created: a snapshot whose row is gone is skipped. Every
/// per-key failure is logged and skipped; only a failure to list the keys
/// ends the pass early.
pub async fn restore_timers(service: &TimerService) -> RestoreReport {
    let mut report = RestoreReport::default();

    let keys = match service.snapshot_keys(SNAPSHOT_KEY_PREFIX).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "Failed to list timer snapshots, nothing restored");
            return report;
        }
    };

    for key in keys {
        report.scanned += 1;

        let raw = match service.read_snapshot(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(key = %key, "Snapshot expired before it could be restored");
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read timer snapshot");
                report.skipped += 1;
                continue;
            }
        };

        let snapshot: Timer = match serde_json::from_str(&raw) {
            Ok(timer) => timer,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to deserialize timer snapshot");
                report.skipped += 1;
                continue;
            }
        };

        let id = snapshot.id;
        match service.reconcile(snapshot).await {
            Ok(timer) => {
                info!(
                    key = %key,
                    id,
                    current_time = timer.current_time,
                    is_paused = timer.is_paused,
                    "Restored timer from snapshot"
                );
                report.restored += 1;
            }
            Err(e) => {
                warn!(key = %key, id, error = %e, "Failed to restore timer");
                report.skipped += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        restored = report.restored,
        skipped = report.skipped,
        "Timer restore finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::service::tests::fixture,
        services::{snapshot_key, SnapshotCache, TimerRepository, DEFAULT_SNAPSHOT_TTL},
    };

    #[tokio::test]
    async fn stale_row_is_brought_up_to_snapshot() {
        let fx = fixture();
        let timer = fx.repo.create("s1", 60).unwrap();

        let mut snapshot = timer.clone();
        snapshot.current_time = 17;
        snapshot.is_paused = true;
        fx.cache
            .set(
                &snapshot_key("s1"),
                &serde_json::to_string(&snapshot).unwrap(),
                DEFAULT_SNAPSHOT_TTL,
            )
            .unwrap();

        let report = restore_timers(&fx.service).await;

        assert_eq!(
            report,
            RestoreReport {
                scanned: 1,
                restored: 1,
                skipped: 0
            }
        );
        let row = fx.repo.find_by_id(timer.id).unwrap();
        assert_eq!(row.current_time, 17);
        assert!(row.is_paused);
    }

    #[tokio::test]
    async fn bad_snapshots_are_skipped_and_rest_restored() {
        let fx = fixture();
        let good = fx.repo.create("good", 60).unwrap();
        let gone = fx.repo.create("gone", 60).unwrap();
        fx.repo.delete(gone.id).unwrap();

        let mut good_snapshot = good.clone();
        good_snapshot.current_time = 5;
        fx.cache
            .set("timer:broken", "{not json", DEFAULT_SNAPSHOT_TTL)
            .unwrap();
        fx.cache
            .set(
                &snapshot_key("gone"),
                &serde_json::to_string(&gone).unwrap(),
                DEFAULT_SNAPSHOT_TTL,
            )
            .unwrap();
        fx.cache
            .set(
                &snapshot_key("good"),
                &serde_json::to_string(&good_snapshot).unwrap(),
                DEFAULT_SNAPSHOT_TTL,
            )
            .unwrap();

        let report = restore_timers(&fx.service).await;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.restored, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(fx.repo.find_by_id(good.id).unwrap().current_time, 5);
        assert!(fx.repo.find_by_id(gone.id).is_err());
    }

    #[tokio::test]
    async fn restore_never_creates_rows_or_broadcasts() {
        let fx = fixture();
        let (_guard, mut supervisor) = fx
            .registry
            .register("ops", crate::realtime::Role::Supervisor);
        let orphan = Timer::new(77, "orphan", 10);
        fx.cache
            .set(
                &snapshot_key("orphan"),
                &serde_json::to_string(&orphan).unwrap(),
                DEFAULT_SNAPSHOT_TTL,
            )
            .unwrap();

        let report = restore_timers(&fx.service).await;

        assert_eq!(report.skipped, 1);
        assert!(fx.repo.find_active().unwrap().is_empty());
        assert!(supervisor.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_above_max_is_clamped() {
        let fx = fixture();
        let timer = fx.repo.create("s1", 10).unwrap();
        let mut snapshot = timer.clone();
        snapshot.current_time = 500;
        fx.cache
            .set(
                &snapshot_key("s1"),
                &serde_json::to_string(&snapshot).unwrap(),
                DEFAULT_SNAPSHOT_TTL,
            )
            .unwrap();

        restore_timers(&fx.service).await;

        assert_eq!(fx.repo.find_by_id(timer.id).unwrap().current_time, 10);
    }
}
