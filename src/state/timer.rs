//! Timer model shared by the durable store, the snapshot cache and the wire

use serde::{Deserialize, Serialize};

/// Durable-store-assigned timer identifier
pub type TimerId = u64;

/// A single countdown timer
///
/// Serializes to `{id, sessionId, currentTime, maxTime, isPaused}`, which is
/// the shape used for HTTP responses, cache snapshots and `TIMER_UPDATE`
/// payloads alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: TimerId,
    pub session_id: String,
    pub current_time: u64,
    pub max_time: u64,
    pub is_paused: bool,
}

impl Timer {
    /// Create a fresh, running timer at its full duration
    pub fn new(id: TimerId, session_id: impl Into<String>, max_time: u64) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            current_time: max_time,
            max_time,
            is_paused: false,
        }
    }

    /// True when a tick would decrement this timer
    pub fn is_running(&self) -> bool {
        !self.is_paused && self.current_time > 0
    }

    /// Decrement by one if running. Returns whether anything changed.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.current_time -= 1;
        true
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }

    /// Reset both the duration and the remaining time
    pub fn reset(&mut self, max_time: u64) {
        self.max_time = max_time;
        self.current_time = max_time;
    }
}

/// Validate a client-supplied duration
pub fn validate_max_time(max_time: i64) -> Result<u64, String> {
    u64::try_from(max_time).map_err(|_| format!("maxTime must be non-negative, got {}", max_time))
}
