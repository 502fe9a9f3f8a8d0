//! Error types for the Ratewell service.

use thiserror::Error;

/// Main error type for Ratewell operations.
#[derive(Error, Debug)]
pub enum RatewellError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller supplied an argument the rate limiter cannot account for,
    /// such as a negative limit or a negative token amount.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewell operations.
pub type Result<T> = std::result::Result<T, RatewellError>;
