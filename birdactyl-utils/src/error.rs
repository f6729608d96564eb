//! Error types for the Birdactyl console
//!
//! Provides a unified error type used across all console crates.

use std::path::PathBuf;

/// Main error type for console operations
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Not connected to the console")]
    NotConnected,

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Panel API Errors ===

    #[error("Panel returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Session Errors ===

    #[error("Session closed")]
    SessionClosed,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Rejections (auth/permission) are never transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection(_) | Self::ConnectionClosed | Self::Http(_)
        )
    }

    /// Human-readable reason without the category prefix, for log lines
    pub fn reason(&self) -> String {
        match self {
            Self::Connection(msg)
            | Self::ConnectionRejected(msg)
            | Self::Protocol(msg)
            | Self::Http(msg)
            | Self::PermissionDenied(msg) => msg.clone(),
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using ConsoleError
pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConsoleError::ConnectionRejected("insufficient permission".into());
        assert_eq!(err.to_string(), "Connection rejected: insufficient permission");
    }

    #[test]
    fn test_error_display_api() {
        let err = ConsoleError::Api {
            status: 409,
            message: "server is already running".into(),
        };
        assert_eq!(
            err.to_string(),
            "Panel returned status 409: server is already running"
        );
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = ConsoleError::ConfigInvalid {
            path: PathBuf::from("/home/op/.config/birdactyl/console.toml"),
            message: "expected a table".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("console.toml"));
        assert!(msg.contains("expected a table"));
    }

    #[test]
    fn test_retryable() {
        assert!(ConsoleError::Timeout { seconds: 30 }.is_retryable());
        assert!(ConsoleError::connection("reset by peer").is_retryable());
        assert!(ConsoleError::ConnectionClosed.is_retryable());
        assert!(!ConsoleError::ConnectionRejected("forbidden".into()).is_retryable());
        assert!(!ConsoleError::NotConnected.is_retryable());
        assert!(!ConsoleError::config("bad").is_retryable());
    }

    #[test]
    fn test_reason_strips_prefix() {
        assert_eq!(ConsoleError::http("dns failure").reason(), "dns failure");
        assert_eq!(
            ConsoleError::Api {
                status: 500,
                message: "node offline".into()
            }
            .reason(),
            "node offline"
        );
        assert_eq!(
            ConsoleError::Timeout { seconds: 5 }.reason(),
            "Request timed out after 5s"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: ConsoleError = io_err.into();
        assert!(matches!(err, ConsoleError::Io(_)));
    }
}
