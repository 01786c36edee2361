//! Error types for SiteScout.
//!
//! Library crates use [`SiteScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-page crawl failures are *not* errors: they are reported as data inside
//! a crawl report. This type covers the failures that abort an operation.

use std::path::PathBuf;

/// Top-level error type for SiteScout operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of per-page extraction (e.g. client construction).
    #[error("network error: {0}")]
    Network(String),

    /// Manifest, event, or content parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (malformed URL, empty request, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Event stream transport error (closed channel, encode failure).
    #[error("stream error: {0}")]
    Stream(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteScoutError>;

impl SiteScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
