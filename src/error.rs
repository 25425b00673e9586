//! Error types for the Marketguard service.

use thiserror::Error;

/// Main error type for Marketguard operations.
#[derive(Error, Debug)]
pub enum MarketguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid or unparseable rate limit policies
    #[error("Policy error: {0}")]
    Policy(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for MarketguardError {
    fn from(err: config::ConfigError) -> Self {
        MarketguardError::Config(err.to_string())
    }
}

/// Result type alias for Marketguard operations.
pub type Result<T> = std::result::Result<T, MarketguardError>;
