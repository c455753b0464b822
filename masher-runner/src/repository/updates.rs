//! Update repository
//!
//! Resolves update titles to update records and persists the changes a push
//! makes to them (completed requests, status comments).

use anyhow::{Context, Result};
use async_trait::async_trait;
use masher_core::domain::update::Update;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Repository trait for update records
#[async_trait]
pub trait UpdateRepository: Send + Sync {
    /// Looks up an update by its unique title
    async fn find_by_title(&self, title: &str) -> Result<Option<Update>>;

    /// Persists an update record, replacing the one with the same title
    async fn save(&self, update: &Update) -> Result<()>;

    /// Appends a status comment to an update
    async fn add_comment(&self, title: &str, text: &str) -> Result<()>;
}

/// JSON file implementation of UpdateRepository
///
/// The whole store is a single JSON array of update records. Writes go
/// through a temporary file and a rename.
pub struct JsonUpdateRepository {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonUpdateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Update>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read update store {}", self.path.display()))?;

        serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed update store {}", self.path.display()))
    }

    async fn store(&self, updates: &[Update]) -> Result<()> {
        let body = serde_json::to_vec_pretty(updates).context("Failed to serialize updates")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl UpdateRepository for JsonUpdateRepository {
    async fn find_by_title(&self, title: &str) -> Result<Option<Update>> {
        let _guard = self.lock.lock().await;
        let updates = self.load().await?;
        Ok(updates.into_iter().find(|u| u.title == title))
    }

    async fn save(&self, update: &Update) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut updates = self.load().await?;

        match updates.iter_mut().find(|u| u.title == update.title) {
            Some(existing) => *existing = update.clone(),
            None => updates.push(update.clone()),
        }

        self.store(&updates).await?;
        debug!("Saved update {}", update.title);
        Ok(())
    }

    async fn add_comment(&self, title: &str, text: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut updates = self.load().await?;

        let update = updates
            .iter_mut()
            .find(|u| u.title == title)
            .ok_or_else(|| anyhow::anyhow!("Update {} not found", title))?;
        update.comments.push(text.to_string());

        self.store(&updates).await
    }
}
