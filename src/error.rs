//! Centralized error types for mimegate.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mimegate library.
#[derive(Error, Debug)]
pub enum GateError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is missing a required value or holds an invalid one.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request body does not look like an RFC 5322 message.
    #[error("{0}")]
    InvalidMessage(String),

    /// The MIME decoder could not make sense of the message.
    #[error("Failed to parse email: {0}")]
    MimeError(String),
}

/// Convenience alias for `Result<T, GateError>`.
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = GateError::io(
            "/tmp/blob",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/blob"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_message_errors_display_verbatim() {
        assert_eq!(
            GateError::InvalidMessage("Invalid email format".into()).to_string(),
            "Invalid email format"
        );
        assert_eq!(
            GateError::MimeError("bad boundary".into()).to_string(),
            "Failed to parse email: bad boundary"
        );
    }
}
