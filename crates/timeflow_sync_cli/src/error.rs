//! Error types for the CLI.

use thiserror::Error;
use timeflow_sync_engine::SyncError;
use timeflow_sync_storage::StorageError;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Bad command-line input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A sync run ended with `ok: false`.
    #[error("sync failed: {0}")]
    RunFailed(String),

    /// Opening or writing the data directory failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The engine refused an operation.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding output failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
