//! Shared application state handed to every HTTP and push-channel handler

use std::{sync::Arc, time::Instant};

use crate::{engine::TimerService, realtime::ConnectionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub timers: Arc<TimerService>,
    pub registry: Arc<ConnectionRegistry>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(timers: Arc<TimerService>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            timers,
            registry,
            start_time: Instant::now(),
        }
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed().as_secs())
    }
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
