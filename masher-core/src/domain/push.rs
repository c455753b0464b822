//! Push domain types
//!
//! A push request is queued by the orchestrator, turned into a running push
//! pipeline, and finally summarised by a push report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::domain::update::Update;

/// Monotonic sequence number assigned by the orchestrator
pub type PushId = u64;

/// A unit of queued work
///
/// Created on submission, consumed exactly once when dequeued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub id: PushId,
    pub updates: Vec<Update>,
    pub repos: BTreeSet<String>,
    pub resume: bool,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl PushRequest {
    pub fn new(id: PushId, updates: Vec<Update>, repos: BTreeSet<String>, resume: bool) -> Self {
        Self {
            id,
            updates,
            repos,
            resume,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Renders the queued request the way the status surface lists it
    pub fn queue_summary(&self) -> String {
        let mut val = String::new();
        if !self.updates.is_empty() {
            val.push_str("  Move tags\n");
            for update in &self.updates {
                val.push_str(&format!(
                    "  - {} ({})\n",
                    update.title,
                    display_request(update)
                ));
            }
        }
        if !self.repos.is_empty() {
            val.push_str("  Mash repos\n");
            for repo in &self.repos {
                val.push_str(&format!("  - {}\n", repo));
            }
        }
        val
    }
}

fn display_request(update: &Update) -> String {
    update
        .request
        .map(|r| r.to_string())
        .unwrap_or_else(|| "None".to_string())
}

/// One attempted build tag mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAction {
    pub nvr: String,
    pub from_tag: String,
    pub to_tag: String,
}

impl fmt::Display for TagAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {} => {}", self.nvr, self.from_tag, self.to_tag)
    }
}

/// Stage a push pipeline is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushPhase {
    Queued,
    Locking,
    Checking,
    Moving,
    Mashing,
    CompletingRequests,
    GeneratingMetadata,
    Publishing,
    CachingRepodata,
    Syncing,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for PushPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PushPhase::Queued => "queued",
            PushPhase::Locking => "locking",
            PushPhase::Checking => "checking",
            PushPhase::Moving => "moving",
            PushPhase::Mashing => "mashing",
            PushPhase::CompletingRequests => "completing-requests",
            PushPhase::GeneratingMetadata => "generating-metadata",
            PushPhase::Publishing => "publishing",
            PushPhase::CachingRepodata => "caching-repodata",
            PushPhase::Syncing => "syncing",
            PushPhase::Notifying => "notifying",
            PushPhase::Done => "done",
            PushPhase::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Live snapshot of a running pipeline, published for the status surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushProgress {
    pub id: PushId,
    pub phase: PushPhase,
    pub repos: Vec<String>,
    /// (title, request) of every update in the batch
    pub updates: Vec<(String, String)>,
    pub actions: Vec<TagAction>,
}

impl PushProgress {
    /// Snapshot of a request that has not started executing yet
    pub fn queued(request: &PushRequest) -> Self {
        Self {
            id: request.id,
            phase: PushPhase::Queued,
            repos: request.repos.iter().cloned().collect(),
            updates: request
                .updates
                .iter()
                .map(|u| (u.title.clone(), display_request(u)))
                .collect(),
            actions: Vec::new(),
        }
    }
}

impl fmt::Display for PushProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[ Mash Task #{} ]", self.id)?;
        match self.phase {
            PushPhase::Moving => {
                writeln!(f, "  Moving Updates")?;
                for action in &self.actions {
                    writeln!(f, "   {}", action)?;
                }
            }
            PushPhase::Mashing => {
                writeln!(f, "  Mashing Repos {:?}", self.repos)?;
                for (title, request) in &self.updates {
                    writeln!(f, "   {} ({})", title, request)?;
                }
            }
            PushPhase::GeneratingMetadata => {
                writeln!(f, "  Generating extended update metadata")?;
            }
            phase => {
                writeln!(f, "  Phase: {}", phase)?;
            }
        }
        Ok(())
    }
}

/// Outcome of a finished pipeline, handed back to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReport {
    pub id: PushId,
    pub success: bool,
    pub errors: Vec<String>,
    pub actions: Vec<TagAction>,
    /// Repositories the push targeted, composed or not
    pub repos: Vec<String>,
    /// Retrievable log written by the composition stage
    pub log_path: Option<PathBuf>,
    /// Contents of `log_path`, captured only for failed pushes
    pub log_output: Option<String>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl PushReport {
    /// Report for a push that never produced any output of its own
    pub fn failed(id: PushId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            errors: vec![error.into()],
            actions: Vec::new(),
            repos: Vec::new(),
            log_path: None,
            log_output: None,
            finished_at: chrono::Utc::now(),
        }
    }

    /// Subject line of the operations report mail
    pub fn subject(&self) -> String {
        format!("Masher Report {}", self.finished_at.format("%y%m%d.%H%M"))
    }

    /// Renders the operations report body
    pub fn render(&self) -> String {
        let mut val = format!("[ Mash Task #{} ]\n", self.id);
        val.push_str(&format!(
            "The following actions were {}successful.",
            if self.success { "" } else { "*NOT* " }
        ));
        if !self.errors.is_empty() {
            val.push_str("\n The following errors occured:\n");
            for error in &self.errors {
                val.push_str(error);
                val.push('\n');
            }
        }
        if !self.actions.is_empty() {
            val.push_str("\n  Moved the following package tags:\n");
            for action in &self.actions {
                val.push_str(&format!("   {}\n", action));
            }
        }
        if !self.repos.is_empty() {
            val.push_str("\n  Mashed the following repositories:\n");
            for repo in &self.repos {
                val.push_str(&format!("  - {}\n", repo));
            }
        }
        if !self.success {
            if let Some(output) = &self.log_output {
                val.push_str(&format!("\nMash Output:\n\n{}", output));
            }
        }
        val
    }
}
