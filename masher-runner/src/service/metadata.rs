//! Update advisory metadata
//!
//! Produces `updateinfo.xml` for every architecture of a freshly composed
//! repository and registers it in that architecture's `repomd.xml`. A JSON
//! sidecar (`updateinfo.json`) holding the same records is written next to it;
//! the cached sidecar from the previous push is the input for incremental
//! generation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use masher_core::domain::update::{Update, UpdateStatus};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub const UPDATEINFO_XML: &str = "updateinfo.xml";
pub const UPDATEINFO_JSON: &str = "updateinfo.json";

/// One advisory in the metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub id: String,
    pub release: String,
    pub status: UpdateStatus,
    pub issued: DateTime<Utc>,
    pub description: String,
    pub bugs: Vec<u32>,
    pub packages: Vec<String>,
}

impl AdvisoryRecord {
    pub fn from_update(update: &Update) -> Self {
        Self {
            id: update.title.clone(),
            release: update.release.long_name.clone(),
            status: update.status,
            issued: update.date_pushed.unwrap_or_else(Utc::now),
            description: update.notes.clone(),
            bugs: update.bugs.clone(),
            packages: update.builds.iter().map(|b| b.nvr.clone()).collect(),
        }
    }
}

/// Service trait for generating update advisory metadata
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    /// Generates and injects metadata into every architecture of `repo_dir`
    ///
    /// # Arguments
    /// * `repo` - Logical repository name
    /// * `repo_dir` - Composed tree holding one subdirectory per architecture
    /// * `prior` - Cached sidecar from the previous push of this repository
    /// * `updates` - Updates handled by the current push
    async fn generate(
        &self,
        repo: &str,
        repo_dir: &Path,
        prior: Option<&Path>,
        updates: &[Update],
    ) -> Result<usize>;
}

/// Standard implementation of MetadataGenerator
pub struct UpdateInfoGenerator;

impl UpdateInfoGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Merges prior records with the updates of this push
    ///
    /// Records for updates handled by this push are always dropped from the
    /// prior set; they come back only if the update now belongs in `repo`.
    pub fn merge(repo: &str, prior: Vec<AdvisoryRecord>, updates: &[Update]) -> Vec<AdvisoryRecord> {
        let mut records: BTreeMap<String, AdvisoryRecord> =
            prior.into_iter().map(|r| (r.id.clone(), r)).collect();

        for update in updates {
            records.remove(&update.title);
            if belongs_to(repo, update) {
                records.insert(update.title.clone(), AdvisoryRecord::from_update(update));
            }
        }

        records.into_values().collect()
    }
}

impl Default for UpdateInfoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataGenerator for UpdateInfoGenerator {
    async fn generate(
        &self,
        repo: &str,
        repo_dir: &Path,
        prior: Option<&Path>,
        updates: &[Update],
    ) -> Result<usize> {
        let prior_records = match prior {
            Some(path) => {
                debug!("Using cached metadata {}", path.display());
                let raw = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_slice(&raw)
                    .with_context(|| format!("Malformed metadata cache {}", path.display()))?
            }
            None => Vec::new(),
        };

        let records = Self::merge(repo, prior_records, updates);
        let xml = render_updateinfo(&records);
        let json = serde_json::to_vec_pretty(&records).context("Failed to serialize advisories")?;

        let mut entries = tokio::fs::read_dir(repo_dir)
            .await
            .with_context(|| format!("Failed to list {}", repo_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let repodata = entry.path().join("repodata");
            if !repodata.is_dir() {
                continue;
            }

            tokio::fs::write(repodata.join(UPDATEINFO_XML), &xml).await?;
            tokio::fs::write(repodata.join(UPDATEINFO_JSON), &json).await?;
            inject_into_repomd(&repodata, &xml).await?;
            debug!("Inserted updateinfo into {}", repodata.display());
        }

        info!("Generated {} advisories for {}", records.len(), repo);
        Ok(records.len())
    }
}

/// Whether an update's advisory is published in `repo`
fn belongs_to(repo: &str, update: &Update) -> bool {
    match update.status {
        UpdateStatus::Stable => update.release.stable_repo() == repo,
        UpdateStatus::Testing => update.release.testing_repo() == repo,
        _ => false,
    }
}

/// Renders the advisory document
pub fn render_updateinfo(records: &[AdvisoryRecord]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<updates>\n");

    for record in records {
        let kind = match record.status {
            UpdateStatus::Stable => "stable",
            _ => "testing",
        };
        xml.push_str(&format!(
            "  <update from=\"updates\" status=\"{}\" type=\"enhancement\" version=\"1.0\">\n",
            kind
        ));
        xml.push_str(&format!("    <id>{}</id>\n", escape(&record.id)));
        xml.push_str(&format!("    <title>{}</title>\n", escape(&record.id)));
        xml.push_str(&format!("    <release>{}</release>\n", escape(&record.release)));
        xml.push_str(&format!(
            "    <issued date=\"{}\"/>\n",
            record.issued.format("%Y-%m-%d %H:%M:%S")
        ));
        xml.push_str(&format!(
            "    <description>{}</description>\n",
            escape(&record.description)
        ));

        xml.push_str("    <references>\n");
        for bug in &record.bugs {
            xml.push_str(&format!(
                "      <reference type=\"bugzilla\" id=\"{}\"/>\n",
                bug
            ));
        }
        xml.push_str("    </references>\n");

        xml.push_str("    <pkglist>\n");
        for nvr in &record.packages {
            xml.push_str(&format!("      <package nvr=\"{}\"/>\n", escape(nvr)));
        }
        xml.push_str("    </pkglist>\n  </update>\n");
    }

    xml.push_str("</updates>\n");
    xml
}

/// Registers the advisory document in `repomd.xml`, replacing any earlier entry
async fn inject_into_repomd(repodata: &Path, xml: &str) -> Result<()> {
    let repomd_path = repodata.join("repomd.xml");
    let repomd = tokio::fs::read_to_string(&repomd_path)
        .await
        .with_context(|| format!("Failed to read {}", repomd_path.display()))?;

    let checksum = hex::encode(Sha256::digest(xml.as_bytes()));
    let entry = format!(
        "  <data type=\"updateinfo\">\n    <location href=\"repodata/{}\"/>\n    <checksum type=\"sha256\">{}</checksum>\n    <timestamp>{}</timestamp>\n  </data>\n",
        UPDATEINFO_XML,
        checksum,
        Utc::now().timestamp()
    );

    let updated = strip_updateinfo_entry(&repomd);
    let Some(end) = updated.rfind("</repomd>") else {
        anyhow::bail!("{} has no closing repomd element", repomd_path.display());
    };

    let mut out = String::with_capacity(updated.len() + entry.len());
    out.push_str(&updated[..end]);
    out.push_str(&entry);
    out.push_str(&updated[end..]);

    tokio::fs::write(&repomd_path, out).await?;
    Ok(())
}

fn strip_updateinfo_entry(repomd: &str) -> String {
    const START: &str = "<data type=\"updateinfo\">";
    const END: &str = "</data>";

    let Some(start) = repomd.find(START) else {
        return repomd.to_string();
    };
    let Some(len) = repomd[start..].find(END) else {
        return repomd.to_string();
    };

    // Drop the indentation before the element and the newline after it
    let line_start = repomd[..start].rfind('\n').map(|i| i + 1).unwrap_or(start);
    let mut end = start + len + END.len();
    if repomd[end..].starts_with('\n') {
        end += 1;
    }

    format!("{}{}", &repomd[..line_start], &repomd[end..])
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
