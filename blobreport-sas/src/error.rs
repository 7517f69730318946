//! Signing and patching error types.

use thiserror::Error;

/// Result type for SAS operations.
pub type SasResult<T> = Result<T, SasError>;

/// Errors that can occur while signing tokens or patching the entry page.
#[derive(Debug, Error)]
pub enum SasError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("invalid validity window: expiry {expiry} is not after start {start}")]
    InvalidWindow { start: String, expiry: String },

    #[error("missing signed parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid signed parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("malformed entry page: no opening <body> tag")]
    MalformedEntryPage,
}
