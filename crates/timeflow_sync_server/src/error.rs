//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Bearer token missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request body larger than the configured limit.
    #[error("payload too large: {size} bytes exceeds {limit}")]
    PayloadTooLarge {
        /// Size of the rejected body.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// No endpoint at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Unauthorized(_)
                | ServerError::PayloadTooLarge { .. }
                | ServerError::NotFound(_)
                | ServerError::Json(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Returns the HTTP status code this error is answered with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Json(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(ServerError::invalid_request("test").is_client_error());
        assert!(ServerError::unauthorized("test").is_client_error());
        assert!(ServerError::PayloadTooLarge { size: 2, limit: 1 }.is_client_error());
        assert!(!ServerError::Internal("test".into()).is_client_error());
    }

    #[test]
    fn server_errors() {
        assert!(ServerError::Internal("test".into()).is_server_error());
        assert!(!ServerError::NotFound("/x".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::invalid_request("x").status_code(), 400);
        assert_eq!(ServerError::unauthorized("x").status_code(), 401);
        assert_eq!(ServerError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ServerError::PayloadTooLarge { size: 2, limit: 1 }.status_code(), 413);
        assert_eq!(ServerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn display_messages() {
        let err = ServerError::PayloadTooLarge { size: 20, limit: 10 };
        assert_eq!(err.to_string(), "payload too large: 20 bytes exceeds 10");
        assert_eq!(ServerError::unauthorized("bad token").to_string(), "unauthorized: bad token");
    }
}
