//! Publisher error types.

use blobreport_sas::SasError;
use thiserror::Error;

/// Result type for publisher operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while publishing or fetching a report.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("storage request failed with {status} ({code}): {message}")]
    Storage {
        status: u16,
        code: String,
        message: String,
    },

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("user delegation key request rejected: {0}")]
    Delegation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("signing error: {0}")]
    Sas(#[from] SasError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("blob name escapes the target directory: {0}")]
    UnsafePath(String),
}

impl CloudError {
    /// Returns true for failures worth retrying (throttling, server errors,
    /// dropped connections).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
