//! Error types for classdrop.

use thiserror::Error;

/// Common error type for classdrop.
#[derive(Error, Debug)]
pub enum ClassdropError {
    /// A backend call failed (document store or blob store).
    ///
    /// Errors from sqlx are automatically converted.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A generated identifier collided with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for ClassdropError {
    fn from(e: sqlx::Error) -> Self {
        ClassdropError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ClassdropError {
    fn from(e: serde_json::Error) -> Self {
        ClassdropError::Serialization(e.to_string())
    }
}

/// Result type alias for classdrop operations.
pub type Result<T> = std::result::Result<T, ClassdropError>;
