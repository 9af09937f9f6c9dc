//! Error types for tenderscan.
//!
//! Library crates use [`TenderScanError`] via `thiserror`.
//! Entry points (API server, importer) live outside this workspace and wrap
//! these errors however suits them.

use std::path::PathBuf;

/// Top-level error type for all tenderscan operations.
///
/// Transient per-fetch failures (timeout, refused connection, non-2xx) are
/// deliberately NOT represented here: the fetcher folds them into its
/// "unavailable" outcome so that one dead candidate URL never aborts a scan.
#[derive(Debug, thiserror::Error)]
pub enum TenderScanError {
    /// Configuration loading or validation error, including a declared site
    /// URL that cannot be turned into a usable base URL.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP infrastructure error (client construction and the like).
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing site fields, malformed stored rows).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Anything not anticipated by the other variants, including task
    /// panics surfaced at the orchestrator boundary.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderScanError>;

impl TenderScanError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
