//! Error types for windowgate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for windowgate operations.
#[derive(Error, Debug)]
pub enum WindowgateError {
    /// The per-window request allowance was below one.
    #[error("Window max size must be at least 1, got {0}")]
    InvalidMaxSize(u64),

    /// The window length was zero.
    #[error("Window duration must be greater than zero, got {0:?}")]
    InvalidDuration(Duration),

    /// Configuration file or environment errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON output errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WindowgateError {
    /// Whether this error was raised while validating limiter parameters.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            WindowgateError::InvalidMaxSize(_)
                | WindowgateError::InvalidDuration(_)
                | WindowgateError::Config(_)
        )
    }
}

impl From<::config::ConfigError> for WindowgateError {
    fn from(err: ::config::ConfigError) -> Self {
        WindowgateError::Config(err.to_string())
    }
}

/// Result type alias for windowgate operations.
pub type Result<T> = std::result::Result<T, WindowgateError>;
