//! Masher HTTP Clients
//!
//! Type-safe HTTP clients used by the masher:
//! - [`BuildSystemClient`] talks to the build system's tag and task API
//! - [`MasherClient`] talks to the masher daemon (used by the CLI)
//!
//! # Example
//!
//! ```no_run
//! use masher_client::BuildSystemClient;
//!
//! #[tokio::main]
//! async fn main() -> masher_client::Result<()> {
//!     let client = BuildSystemClient::new("http://localhost:8081");
//!     let builds = client.list_tagged("dist-f8-updates-testing").await?;
//!     println!("{} builds tagged for testing", builds.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod pushes;
mod tags;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use tags::{CallResult, Multicall, TaggedBuild};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the build system
///
/// Provides tag queries, batched tag mutations and task polling.
#[derive(Debug, Clone)]
pub struct BuildSystemClient {
    /// Base URL of the build system API (e.g., "http://localhost:8081")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BuildSystemClient {
    /// Create a new build system client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new build system client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the build system
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// HTTP client for the masher daemon API
#[derive(Debug, Clone)]
pub struct MasherClient {
    /// Base URL of the daemon (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl MasherClient {
    /// Create a new daemon client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Get the base URL of the daemon
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Checks the status of a response and deserializes its JSON body
///
/// Failed responses carry `{"error": "..."}`; the message is lifted out of
/// it when present, otherwise the raw body is kept.
pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_message(body)));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BuildSystemClient::new("http://localhost:8081");
        assert_eq!(client.base_url(), "http://localhost:8081");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BuildSystemClient::new("http://localhost:8081/");
        assert_eq!(client.base_url(), "http://localhost:8081");

        let client = MasherClient::new("http://localhost:8080///");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"Update foo-1.0-1 not found"}"#.to_string()),
            "Update foo-1.0-1 not found"
        );
        assert_eq!(error_message("Bad Gateway".to_string()), "Bad Gateway");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = BuildSystemClient::with_client("http://localhost:8081", http_client);
        assert_eq!(client.base_url(), "http://localhost:8081");
    }
}
