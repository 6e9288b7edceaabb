//! Core error type definitions

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for cleaners operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cleaners operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An owner was used outside its lifecycle, e.g. read before `setup`
    #[error("usage error in {operation}: {message}")]
    Usage { operation: String, message: String },

    /// A worker pool did not drain within its bound
    #[error("cleanup of '{resource}' did not complete within {timeout:?}")]
    CleanupTimeout { resource: String, timeout: Duration },

    /// A submitted task panicked or was dropped before completing
    #[error("task '{task}' failed: {message}")]
    TaskFailure { task: String, message: String },

    /// A cooperative interrupt was observed while waiting
    #[error("interrupted while waiting for {operation}")]
    Interrupted { operation: String },

    /// Work was offered to a resource that no longer accepts it
    #[error("'{resource}' rejected work: {message}")]
    Rejected { resource: String, message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{}': {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether this error came from a cooperative interrupt
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted { .. })
    }
}
