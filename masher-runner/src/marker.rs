//! Resumption marker
//!
//! A `MASHING` file in the mashed directory signals that a push is in
//! progress. It records the titles of the updates in that push so a crashed
//! push can be resumed. At most one marker exists at a time; its presence
//! blocks every non-resuming push until an operator resumes or removes it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::error::{PushError, Result};

const MARKER_FORMAT_VERSION: u32 = 1;

/// On-disk representation of the marker
#[derive(Debug, Serialize, Deserialize)]
struct MarkerRecord {
    version: u32,
    created_at: chrono::DateTime<chrono::Utc>,
    updates: Vec<String>,
}

/// How the marker was acquired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker existed; a fresh one now lists the requested titles
    Created,
    /// An existing marker was adopted; these titles were recorded in it
    Resumed(Vec<String>),
}

/// Handle on the resumption marker file
#[derive(Debug, Clone)]
pub struct PushMarker {
    path: PathBuf,
}

impl PushMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Acquires the marker for a push of `titles`
    ///
    /// - absent: writes a new marker listing `titles`
    /// - present and `resume`: returns the titles recorded in it
    /// - present and not `resume`: fails with [`PushError::PreviousPushIncomplete`]
    pub async fn acquire(&self, titles: &[String], resume: bool) -> Result<MarkerState> {
        if self.exists() {
            if !resume {
                error!(
                    "Previous mash not complete! Either resume the last push, or remove {}",
                    self.path.display()
                );
                return Err(PushError::PreviousPushIncomplete {
                    marker: self.path.clone(),
                });
            }

            debug!("Resuming previous push from {}", self.path.display());
            let titles = self.read().await?;
            return Ok(MarkerState::Resumed(titles));
        }

        debug!("Creating lock for updates push: {}", self.path.display());
        self.write(titles).await?;
        Ok(MarkerState::Created)
    }

    /// Reads the update titles recorded in the marker
    pub async fn read(&self) -> Result<Vec<String>> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read marker {}", self.path.display()))?;

        let record: MarkerRecord = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed marker {}", self.path.display()))?;

        Ok(record.updates)
    }

    /// Removes the marker
    ///
    /// Returns `false` (and logs) when there was no marker to remove.
    pub async fn release(&self) -> Result<bool> {
        if !self.exists() {
            error!("Cannot find push marker at {}", self.path.display());
            return Ok(false);
        }

        tokio::fs::remove_file(&self.path).await?;
        info!("Removed push marker {}", self.path.display());
        Ok(true)
    }

    /// Writes the marker through a temporary file so readers never see a partial record
    async fn write(&self, titles: &[String]) -> Result<()> {
        let record = MarkerRecord {
            version: MARKER_FORMAT_VERSION,
            created_at: chrono::Utc::now(),
            updates: titles.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&record).context("Failed to serialize marker")?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
