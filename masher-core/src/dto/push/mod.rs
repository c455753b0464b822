//! Push DTOs for the daemon API

use serde::{Deserialize, Serialize};

use crate::domain::push::PushId;

/// Request to push a batch of updates by title
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPush {
    pub titles: Vec<String>,
    #[serde(default)]
    pub resume: bool,
}

/// Request to compose bare repositories without moving any tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MashRepos {
    pub repos: Vec<String>,
}

/// Response to an accepted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAccepted {
    pub id: PushId,
    /// Whether the push started immediately instead of waiting in the queue
    pub started: bool,
}

/// Human-readable snapshot of the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasherStatus {
    pub mashing: bool,
    pub queued: usize,
    pub text: String,
}

/// Log of the most recently completed push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastLog {
    pub path: Option<String>,
    pub contents: String,
}
