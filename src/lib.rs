//! Countdown Hub - real-time countdown timers over HTTP and WebSocket
//!
//! Timers tick down once per period, persist to SQLite, snapshot to a TTL
//! cache for restart recovery, and push every change to the owning session's
//! channels and to all supervisor channels.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod realtime;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use engine::{restore_timers, TimerService};
pub use error::TimerError;
pub use realtime::{Broadcaster, ConnectionRegistry, Role};
pub use state::AppState;
pub use tasks::TickEngine;
pub use utils::signals::shutdown_signal;
