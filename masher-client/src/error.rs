//! Error types for the masher clients

use masher_core::domain::buildsys::TaskId;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the build system or the masher daemon
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The build system refused a call inside a multicall batch
    #[error("Build system rejected call for {nvr}: {fault}")]
    CallRejected {
        /// Build the rejected call referred to
        nvr: String,
        /// Fault string returned by the build system
        fault: String,
    },

    /// A build system task was reported as failed
    #[error("Build system task {0} failed")]
    TaskFailed(TaskId),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Whether the daemon or build system answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}
