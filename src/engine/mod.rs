//! Timer engine: the command surface and the startup restore

pub mod restore;
pub mod service;

// Re-export main types
pub use restore::{restore_timers, RestoreReport};
pub use service::TimerService;
