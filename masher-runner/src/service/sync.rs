//! Mirror sync waiter
//!
//! Blocks until the master mirror serves the repository metadata that was
//! just published. Polls on a fixed interval with no timeout; fetch errors
//! are logged and retried.

use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::repository::MirrorRepository;

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Matched,
    Cancelled,
}

/// Hex encoded SHA-256 of a document
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checksum of a local file
pub async fn file_checksum(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(checksum(&bytes))
}

pub struct MirrorSyncWaiter {
    mirror: Arc<dyn MirrorRepository>,
    interval: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl MirrorSyncWaiter {
    pub fn new(mirror: Arc<dyn MirrorRepository>, interval: Duration) -> Self {
        Self {
            mirror,
            interval,
            cancel: None,
        }
    }

    /// Stops waiting once `true` is sent on the channel
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Polls the mirror document until its checksum equals `local_checksum`
    ///
    /// # Arguments
    /// * `local_checksum` - Checksum of the locally published document
    /// * `url_template` - Mirror URL with a `{version}` placeholder
    /// * `version` - Release version substituted into the template
    pub async fn wait_for_checksum_match(
        &self,
        local_checksum: &str,
        url_template: &str,
        version: &str,
    ) -> SyncOutcome {
        let url = url_template.replace("{version}", version);
        info!("Waiting for updates to hit mirror {}", url);

        let mut cancel = self.cancel.clone();
        loop {
            match cancel.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = rx.wait_for(|cancelled| *cancelled) => {
                            info!("Mirror sync wait cancelled");
                            return SyncOutcome::Cancelled;
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }

            let body = match self.mirror.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Error fetching repomd.xml: {:#}", e);
                    continue;
                }
            };

            let remote = checksum(&body);
            if remote == local_checksum {
                debug!("master repomd.xml matches!");
                return SyncOutcome::Matched;
            }
            debug!(
                "master repomd.xml doesn't match! {} != {}",
                local_checksum, remote
            );
        }
    }
}
