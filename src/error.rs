//! Error types for the Coalescer crate.

use thiserror::Error;

/// Main error type for Coalescer operations.
#[derive(Error, Debug)]
pub enum CoalescerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter was constructed outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Failure reported by a reload handler.
///
/// Handler failures never reach the caller of
/// [`register_change`](crate::coalesce::CoalescingLimiter::register_change);
/// they are handed to an [`ErrorSink`](crate::coalesce::ErrorSink) instead.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Generic handler failure
    #[error("{0}")]
    Failed(String),

    /// An external reload command exited unsuccessfully
    #[error("reload command failed (exit status {}):\n{output}", exit_status(.status))]
    Command {
        /// Exit code, `None` when terminated by a signal
        status: Option<i32>,
        /// Combined stdout and stderr
        output: String,
    },

    /// The handler panicked while running
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any message.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

fn exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Result type alias for Coalescer operations.
pub type Result<T> = std::result::Result<T, CoalescerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = HandlerError::Command {
            status: Some(2),
            output: "bad config".to_string(),
        };
        assert_eq!(err.to_string(), "reload command failed (exit status 2):\nbad config");

        let err = HandlerError::Command {
            status: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("exit status signal"));
    }

    #[test]
    fn test_msg() {
        assert_eq!(HandlerError::msg("boom").to_string(), "boom");
    }
}
