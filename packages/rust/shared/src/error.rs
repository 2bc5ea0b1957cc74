//! Error types for the gift-refresh pipeline.
//!
//! Library crates use [`RefreshError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Missing credentials or an unreadable/invalid config file.
    #[error("config error: {message}")]
    Config { message: String },

    /// The generation endpoint answered with a non-success status.
    #[error("generation request failed ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The generation call succeeded but carried no usable text.
    #[error("no text returned from the generation endpoint")]
    EmptyResponse,

    /// Generated content broke a structural or affiliate-tag rule.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error (templates, posts, catalog index).
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Transport-level failure talking to the generation endpoint, including timeouts.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed response body or date/flag value.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RefreshError>;

impl RefreshError {
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

    /// Whether this error only concerns the candidate being refreshed.
    ///
    /// Candidate-scoped errors are logged and skipped during the refresh phase;
    /// everything else aborts the run.
    pub fn is_candidate_scoped(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::EmptyResponse
                | Self::Validation { .. }
                | Self::Network(_)
                | Self::Parse { .. }
        )
    }
}
