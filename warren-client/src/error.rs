//! Error types for the container host client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to a container host
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Non-2xx response without a parseable envelope
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The host answered with an error envelope, or a completed operation
    /// carried an error
    #[error("{message}")]
    Remote {
        /// Error code reported by the host, 0 if absent
        code: i64,
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// An async operation kept answering with further async operations
    #[error("Operation {operation} still pending after {hops} hops")]
    AsyncChainTooDeep { operation: String, hops: usize },

    /// Client certificate or key could not be loaded
    #[error("Invalid client identity: {0}")]
    Identity(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
            || matches!(self, Self::Remote { code: 404, .. })
    }
}
