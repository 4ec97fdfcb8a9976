//! Error types for ragstream.
//!
//! Library crates use [`RagstreamError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for startup diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ragstream operations.
#[derive(Debug, thiserror::Error)]
pub enum RagstreamError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a collaborator service.
    #[error("network error: {0}")]
    Network(String),

    /// Incoming query failed validation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Retrieval service returned an error or an unusable response.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Language model request or stream failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// Pipeline assembly error (e.g. no stages).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RagstreamError>;

impl RagstreamError {
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

    /// Whether this error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
