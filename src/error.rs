//! Error types for Floodgate.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// Quota exhaustion is not represented here: a rejected request is a normal
/// [`Admission`](crate::ratelimit::Admission) outcome, not a failure.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
