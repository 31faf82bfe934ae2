//! Internal error types for offcast-reqwest.

use offcast_runtime::OffloadError;
use thiserror::Error;

/// Result type alias for offcast-reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type for offcast-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The remote answered with a shape the client cannot use.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<Error> for OffloadError {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => OffloadError::Transport {
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    e.to_string()
                },
            },
            Error::Serde(e) => OffloadError::Serialization(e),
            Error::UnexpectedResponse(message) => OffloadError::Transport { message },
        }
    }
}
