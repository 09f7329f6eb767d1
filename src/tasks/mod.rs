//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod tick_engine;

pub use tick_engine::{tick_once, TickEngine, TickEngineError, TickHandle, TickReport, DEFAULT_TICK_INTERVAL};
