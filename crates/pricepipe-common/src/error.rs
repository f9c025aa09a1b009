//! Error types shared across pricepipe crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, PricepipeError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum PricepipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl PricepipeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
