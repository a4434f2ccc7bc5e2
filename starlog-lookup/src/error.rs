//! Lookup error types.

use thiserror::Error;

/// Errors from remote reference lookups.
#[derive(Debug, Error)]
pub enum LookupError {
    /// HTTP request failed.
    #[error("lookup request failed: {0}")]
    RequestFailed(String),

    /// Response body was not the expected shape.
    #[error("failed to parse lookup response: {0}")]
    Parse(String),

    /// Request timed out.
    #[error("lookup request timed out")]
    Timeout,

    /// The remote service cannot be reached.
    #[error("lookup service unavailable: {0}")]
    Unavailable(String),

    /// Client configuration error.
    #[error("lookup configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::Timeout
        } else if err.is_connect() {
            LookupError::Unavailable(err.to_string())
        } else if err.is_decode() {
            LookupError::Parse(err.to_string())
        } else {
            LookupError::RequestFailed(err.to_string())
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LookupError>;
