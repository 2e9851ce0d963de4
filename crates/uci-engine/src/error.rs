//! Engine channel error types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(String),

    #[error("Engine did not respond within {0:?}")]
    Unavailable(Duration),

    #[error("Engine channel closed")]
    Closed,

    #[error("Search was cancelled")]
    Cancelled,

    #[error("Engine reported no move")]
    NoMove,
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
