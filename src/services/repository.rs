//! Durable store contract

use crate::{
    error::Result,
    state::{Timer, TimerId},
};

/// Authoritative record of every timer.
///
/// Implementations are blocking; async callers go through
/// `tokio::task::spawn_blocking`. Deleted timers are invisible to every
/// method: `find_by_id`, `update` and `delete` report
/// [`TimerError::NotFound`](crate::error::TimerError::NotFound) for them and
/// `find_active` skips them.
pub trait TimerRepository: Send + Sync {
    /// Insert a new timer at full duration and return it with its assigned id
    fn create(&self, session_id: &str, max_time: u64) -> Result<Timer>;

    fn find_by_id(&self, id: TimerId) -> Result<Timer>;

    /// Overwrite every mutable field of an existing timer
    fn update(&self, timer: &Timer) -> Result<()>;

    fn delete(&self, id: TimerId) -> Result<()>;

    /// All non-deleted timers, ordered by id
    fn find_active(&self) -> Result<Vec<Timer>>;
}
