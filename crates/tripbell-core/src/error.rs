//! Tripbell error type.

use thiserror::Error;

/// Errors shared by every Tripbell crate.
#[derive(Debug, Error)]
pub enum TripbellError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TripbellError>;
