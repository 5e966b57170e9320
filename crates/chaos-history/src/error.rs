//! History error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while writing or reading a history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// IO error on the history file.
    #[error("history IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A payload could not be encoded.
    #[error("failed to encode history record: {0}")]
    Encode(#[from] serde_json::Error),

    /// A line could not be decoded.
    #[error("malformed history record at {path}:{line}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    /// The recorder was already closed.
    #[error("history {0} is closed")]
    Closed(PathBuf),

    /// A writer panicked while holding the file lock.
    #[error("history writer for {0} is poisoned")]
    Poisoned(PathBuf),
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
