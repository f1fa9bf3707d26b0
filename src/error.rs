//! Custom error types for the stage driver.
//!
//! This module defines the primary error type, `StageError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures a serial-attached
//! motion controller can produce, from configuration problems to transport
//! timeouts.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically related to
//!   file parsing or format issues in the configuration files.
//! - **`Configuration`**: Semantic errors in the configuration, such as values
//!   that parse but are logically invalid (e.g., an empty port name). These
//!   are caught during the validation step.
//! - **`Connection`**: The serial port could not be opened or was lost
//!   (permission denied, not found, already in use).
//! - **`Timeout`**: A write or read exceeded the configured deadline. The
//!   driver performs no automatic retry; the caller decides whether to
//!   re-issue the command.
//! - **`Io`**: Wraps `std::io::Error` for transport failures that are neither
//!   a connect failure nor a timeout.
//! - **`UnexpectedEof`**: The port reported end-of-stream mid-response, which
//!   should not happen on a live serial link.
//! - **`Protocol`**: The response did not match the expected acknowledgment
//!   grammar. Only produced by the opt-in [`crate::instrument::Ack`]
//!   classifier; the command methods themselves pass responses through
//!   unparsed.
//! - **`Worker`**: Failures in the background timelapse task (double start,
//!   panicked I/O task).
//!
//! By using `#[from]`, `StageError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the `?`
//! operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, StageError>;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Failed to open serial port '{port}': {message}")]
    Connection { port: String, message: String },

    #[error("Serial operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected EOF from serial port")]
    UnexpectedEof,

    #[error("Unexpected stage response: {0}")]
    Protocol(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StageError::Connection {
            port: "COM6".to_string(),
            message: "access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open serial port 'COM6': access denied"
        );
    }

    #[test]
    fn test_timeout_display_includes_duration() {
        let err = StageError::Timeout(Duration::from_secs(1));
        assert!(err.to_string().contains("1s"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: StageError = io.into();
        assert!(matches!(err, StageError::Io(_)));
    }
}
