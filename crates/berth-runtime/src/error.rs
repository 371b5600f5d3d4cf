//! Error types for the runtime crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while driving external tools.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        /// Command line, without stdin.
        command: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The program did not finish within its time limit.
    #[error("`{command}` timed out after {secs}s")]
    Timeout {
        /// Command line, without stdin.
        command: String,
        /// Limit that was exceeded.
        secs: u64,
    },

    /// A filesystem operation failed.
    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A compose document could not be read or written.
    #[error("compose document error: {0}")]
    Compose(String),

    /// The HTTP client could not be built.
    #[error("configuration error: {0}")]
    Config(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] berth_store::StoreError),
}

impl RuntimeError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
