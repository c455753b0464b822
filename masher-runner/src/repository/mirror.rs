//! Mirror repository
//!
//! Fetches repository metadata documents from the public master mirror.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

/// Repository trait for reading documents off the mirror
#[async_trait]
pub trait MirrorRepository: Send + Sync {
    /// Fetches the body of `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP implementation of MirrorRepository
pub struct HttpMirrorRepository {
    client: Client,
}

impl HttpMirrorRepository {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpMirrorRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MirrorRepository for HttpMirrorRepository {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Failed to fetch {}: {}", url, status);
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        Ok(body.to_vec())
    }
}
