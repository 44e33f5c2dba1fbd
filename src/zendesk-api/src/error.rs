//! Error types for Zendesk API operations.
//!
//! Every failure reaching the ticket service surfaces as an [`ApiError`].
//! Errors carry enough classification for the retry policy to decide whether
//! a request may be sent again.

use thiserror::Error;

/// Errors that can occur while talking to Zendesk.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The configured service URL could not be turned into an API host.
    #[error("Invalid Zendesk URL: {0}")]
    InvalidUrl(String),

    /// Zendesk answered with a non-success status.
    #[error("Zendesk API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// API rate limited.
    #[error("Rate limited by Zendesk: retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The connection could not be established.
    #[error("Connection to Zendesk failed: {0}")]
    Connect(String),

    /// Request exceeded the configured timeout.
    #[error("Zendesk request timed out: {0}")]
    Timeout(String),

    /// Any other transport-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body was not what we expected.
    #[error("Could not decode Zendesk response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the failure is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Network(_) | Self::RateLimited { .. } => {
                true
            }
            Self::Http { status, .. } => is_retryable_status(*status),
            Self::InvalidUrl(_) | Self::Decode(_) => false,
        }
    }

    /// Whether the request certainly never reached Zendesk's business logic.
    ///
    /// Only these failures may be replayed for non-idempotent calls.
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::RateLimited { .. })
    }
}

/// Classify an HTTP status as retryable or terminal.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::Connect(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}

/// Result type for Zendesk operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
