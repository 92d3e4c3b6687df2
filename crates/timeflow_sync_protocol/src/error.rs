//! Error types for protocol encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol bodies.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A body was well-formed JSON but missing a required part.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }
}
