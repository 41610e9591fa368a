//! Error types for plan configuration

use thiserror::Error;

/// Result type alias using [`ConfigError`]
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating a plan configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid name of \"{0}\". Use the suffix .config.json.")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
