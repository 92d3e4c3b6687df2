//! Error types for the sync engine.

use thiserror::Error;
use timeflow_sync_protocol::ProtocolError;
use timeflow_sync_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these escape [`crate::SyncEngine::run_once`]; they are folded into
/// a failed [`crate::RunResult`] whose `error` is the `Display` text.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request did not complete within the configured timeout.
    #[error("request timeout")]
    Timeout,

    /// The server could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    ///
    /// `message` is the server's `error` field when present, else `HTTP <status>`.
    #[error("{message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// A 2xx response body was not the expected JSON.
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),

    /// A response was well-formed but incomplete.
    #[error("{0}")]
    Protocol(String),

    /// The server refused a push or acknowledgement.
    #[error("{0}")]
    Rejected(String),

    /// The host's export or import routine failed.
    #[error("host error: {0}")]
    Host(String),

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding a request or archive failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// Creates an HTTP error from a status and optional server message.
    pub fn http(status: u16, server_message: Option<String>) -> Self {
        Self::Http {
            status,
            message: server_message.unwrap_or_else(|| format!("HTTP {status}")),
        }
    }

    /// Creates a host collaborator error.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    /// Returns true if repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Timeout | SyncError::Network(_) => true,
            SyncError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Short classification used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Timeout => "timeout",
            SyncError::Network(_) => "network",
            SyncError::Http { .. } => "http",
            SyncError::InvalidJson(_) => "invalid_json",
            SyncError::Protocol(_) => "protocol",
            SyncError::Rejected(_) => "rejected",
            SyncError::Host(_) => "host",
            SyncError::Storage(_) => "storage",
            SyncError::Codec(_) => "codec",
        }
    }

    /// HTTP status of the failure, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
