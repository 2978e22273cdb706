//! Error types for the log pipeline.
//!
//! Every failure a caller can observe maps to one `FailureKind`, so callers can
//! branch on the typed outcome while still showing the `Display` reason.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the loglens crate.
#[derive(Debug, Error)]
pub enum LogLensError {
    // Link discovery errors
    #[error("No supported log link found in message")]
    LinkNotFound,

    #[error("Failed to resolve {host} link {url}: {message}")]
    ResolveFailed {
        host: String,
        url: String,
        message: String,
    },

    // Format sniffing errors
    #[error("No archive handler recognized {file_name}")]
    NoHandlerMatched { file_name: String },

    #[error("{reason}")]
    HandlerRejected { handler: String, reason: String },

    // Decode errors
    #[error("Failed to decode {handler} stream: {message}")]
    Decode { handler: String, message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Operation was cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for loglens operations.
pub type Result<T> = std::result::Result<T, LogLensError>;

/// Closed set of outcomes reported to callers alongside the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    LinkNotFound,
    ResolveFailed,
    NoHandlerMatched,
    HandlerRejected,
    DecodeError,
    NetworkFailure,
    Cancelled,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::LinkNotFound => "link_not_found",
            FailureKind::ResolveFailed => "resolve_failed",
            FailureKind::NoHandlerMatched => "no_handler_matched",
            FailureKind::HandlerRejected => "handler_rejected",
            FailureKind::DecodeError => "decode_error",
            FailureKind::NetworkFailure => "network_failure",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for LogLensError {
    fn from(err: std::io::Error) -> Self {
        LogLensError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LogLensError {
    fn from(err: serde_json::Error) -> Self {
        LogLensError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for LogLensError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LogLensError::Timeout(std::time::Duration::from_secs(0))
        } else {
            LogLensError::Network {
                message: err.to_string(),
                cause: err.url().map(|u| u.to_string()),
            }
        }
    }
}

impl LogLensError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LogLensError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a decode error for the named handler.
    pub fn decode(handler: impl Into<String>, message: impl std::fmt::Display) -> Self {
        LogLensError::Decode {
            handler: handler.into(),
            message: message.to_string(),
        }
    }

    /// Map this error to the typed outcome reported to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            LogLensError::LinkNotFound => FailureKind::LinkNotFound,
            LogLensError::ResolveFailed { .. } => FailureKind::ResolveFailed,
            LogLensError::NoHandlerMatched { .. } => FailureKind::NoHandlerMatched,
            LogLensError::HandlerRejected { .. } => FailureKind::HandlerRejected,
            LogLensError::Decode { .. } => FailureKind::DecodeError,

            LogLensError::Network { .. }
            | LogLensError::Timeout(_)
            | LogLensError::RateLimited { .. } => FailureKind::NetworkFailure,

            LogLensError::Cancelled => FailureKind::Cancelled,

            // All other errors are internal errors
            _ => FailureKind::Internal,
        }
    }
}
