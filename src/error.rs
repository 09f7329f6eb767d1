//! Error taxonomy shared by the store, the command surface and both delivery surfaces

use thiserror::Error;

use crate::state::TimerId;

/// Errors surfaced by timer operations
#[derive(Debug, Error)]
pub enum TimerError {
    /// Malformed request or payload, or an identifier that does not parse
    #[error("invalid request: {0}")]
    Validation(String),

    /// Operation on a timer id the durable store does not know
    #[error("timer {0} not found")]
    NotFound(TimerId),

    /// Durable store or snapshot cache I/O failure
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Push channel read or write failure
    #[error("channel transport failure: {0}")]
    Transport(String),
}

impl TimerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Short machine-readable label used in HTTP error bodies and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Transport(_) => "transport",
        }
    }
}

impl From<rusqlite::Error> for TimerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
