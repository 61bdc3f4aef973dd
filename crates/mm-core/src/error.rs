//! Unified error type for mediamill.
//!
//! Every crate funnels its failures into [`Error`]. Callers at the HTTP
//! boundary derive a status code via [`Error::http_status`].

use std::time::Duration;

/// Unified error type covering all failure modes in mediamill.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller passed an argument that can never be valid (e.g. an empty
    /// program name).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request data failed validation before any work was started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested target format has no conversion family.
    #[error("Unsupported target format: {0}")]
    UnsupportedFormat(String),

    /// The external executable could not be spawned.
    #[error("Failed to execute {command}: {message}")]
    CommandNotFound {
        /// Program that failed to start.
        command: String,
        /// Underlying spawn error.
        message: String,
    },

    /// The external process exceeded its wall-clock budget and was killed.
    #[error("Command timeout after {timeout:?}: {command} {args}")]
    CommandTimeout {
        /// Program that timed out.
        command: String,
        /// Space-joined argument list.
        args: String,
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The external process exited with a non-zero status.
    #[error("{command} failed: {message}")]
    CommandFailed {
        /// Program that failed.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured stderr, or a generic message when stderr was empty.
        message: String,
    },

    /// A conversion stage failed; `stage` names it for the user.
    #[error("{stage} failed; {message}")]
    ConversionFailed {
        /// Human-readable stage, e.g. "Image conversion".
        stage: String,
        /// Hint plus the underlying tool message.
        message: String,
    },

    /// The task queue's pending list is at its configured bound.
    #[error("Queue full: {pending} tasks pending (limit {limit})")]
    QueueFull {
        /// Tasks currently waiting.
        pending: usize,
        /// Configured bound.
        limit: usize,
    },

    /// Configuration values are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,
            Error::Validation(_) => 400,
            Error::UnsupportedFormat(_) => 400,
            Error::CommandNotFound { .. } => 502,
            Error::CommandTimeout { .. } => 504,
            Error::CommandFailed { .. } => 502,
            Error::ConversionFailed { .. } => 502,
            Error::QueueFull { .. } => 429,
            Error::InvalidConfiguration(_) => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the error came from running an external tool.
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            Error::CommandNotFound { .. } | Error::CommandTimeout { .. } | Error::CommandFailed { .. }
        )
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Convenience constructor for [`Error::CommandNotFound`].
    pub fn command_not_found(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CommandNotFound {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ConversionFailed`].
    pub fn conversion(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConversionFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
