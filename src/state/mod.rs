//! State management module
//!
//! This module contains the timer model, the push-channel wire types and the
//! shared application state.

pub mod app_state;
pub mod message;
pub mod timer;

// Re-export main types
pub use app_state::AppState;
pub use message::{ClientCommand, MessageType, ServerMessage, WebSocketMessage};
pub use timer::{Timer, TimerId};
