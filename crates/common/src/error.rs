//! Common error types for Temp Voice components.

use thiserror::Error;

/// Errors shared by the Temp Voice crates.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommonError {
    /// An identifier read from storage did not fit the snowflake range.
    #[error("Invalid identifier: {0}")]
    InvalidId(i64),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
