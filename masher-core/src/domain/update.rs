//! Update domain types
//!
//! An update is a set of builds for one release that moves through the
//! candidate, testing and stable tags of the build system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A distribution release that updates are pushed for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Release {
    /// Short name, e.g. "F8"
    pub name: String,
    /// Human readable name used in mail, e.g. "Fedora 8"
    pub long_name: String,
    /// Build system tag prefix, e.g. "dist-f8"
    pub dist_tag: String,
    /// Version substituted into the mirror URL template, e.g. "8"
    pub version: String,
}

/// The promotion stage a build system tag denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Candidate,
    Testing,
    Stable,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Candidate => write!(f, "candidate"),
            TagKind::Testing => write!(f, "testing"),
            TagKind::Stable => write!(f, "stable"),
        }
    }
}

impl Release {
    /// Build system tag for the given promotion stage
    pub fn tag(&self, kind: TagKind) -> String {
        match kind {
            TagKind::Candidate => format!("{}-updates-candidate", self.dist_tag),
            TagKind::Testing => format!("{}-updates-testing", self.dist_tag),
            TagKind::Stable => format!("{}-updates", self.dist_tag),
        }
    }

    /// Name of the stable updates repository, e.g. "f8-updates"
    pub fn stable_repo(&self) -> String {
        format!("{}-updates", self.name.to_lowercase())
    }

    /// Name of the testing updates repository, e.g. "f8-updates-testing"
    pub fn testing_repo(&self) -> String {
        format!("{}-updates-testing", self.name.to_lowercase())
    }
}

/// A single build belonging to an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Name-version-release identifier
    pub nvr: String,
    /// Whether the build reached its current tag through tag inheritance
    #[serde(default)]
    pub inherited: bool,
}

/// Action requested for an update on the next push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRequest {
    Testing,
    Stable,
    Unpush,
    Obsolete,
}

impl fmt::Display for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateRequest::Testing => write!(f, "testing"),
            UpdateRequest::Stable => write!(f, "stable"),
            UpdateRequest::Unpush => write!(f, "unpush"),
            UpdateRequest::Obsolete => write!(f, "obsolete"),
        }
    }
}

/// Current state of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Pending,
    Testing,
    Stable,
    Obsolete,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Pending => write!(f, "pending"),
            UpdateStatus::Testing => write!(f, "testing"),
            UpdateStatus::Stable => write!(f, "stable"),
            UpdateStatus::Obsolete => write!(f, "obsolete"),
        }
    }
}

/// Update record as persisted by the update store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Unique title, conventionally the comma-joined NVRs
    pub title: String,
    pub release: Release,
    pub builds: Vec<Build>,
    pub request: Option<UpdateRequest>,
    pub status: UpdateStatus,
    #[serde(default)]
    pub bugs: Vec<u32>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub date_pushed: Option<chrono::DateTime<chrono::Utc>>,
}

impl Update {
    /// Tag the update's builds carry in their current status
    pub fn current_tag(&self) -> String {
        let kind = match self.status {
            UpdateStatus::Pending | UpdateStatus::Obsolete => TagKind::Candidate,
            UpdateStatus::Testing => TagKind::Testing,
            UpdateStatus::Stable => TagKind::Stable,
        };
        self.release.tag(kind)
    }

    /// Tag the update's builds move to when its request is carried out
    ///
    /// Returns `None` when the update has no pending request.
    pub fn destination_tag(&self) -> Option<String> {
        let kind = match self.request? {
            UpdateRequest::Stable => TagKind::Stable,
            UpdateRequest::Testing => TagKind::Testing,
            UpdateRequest::Obsolete | UpdateRequest::Unpush => TagKind::Candidate,
        };
        Some(self.release.tag(kind))
    }

    /// Tag every build must already carry before the request may be pushed
    ///
    /// `Ok(None)` means the request/status combination needs no tag check.
    /// An update without a request cannot be pushed and yields an error message.
    pub fn expected_tag(&self) -> Result<Option<TagKind>, String> {
        let request = self
            .request
            .ok_or_else(|| format!("Unknown request 'None' for {}", self.title))?;

        let kind = match (request, self.status) {
            (UpdateRequest::Testing, _) => Some(TagKind::Candidate),
            (UpdateRequest::Stable, UpdateStatus::Testing) => Some(TagKind::Testing),
            (UpdateRequest::Stable, UpdateStatus::Pending) => Some(TagKind::Candidate),
            (UpdateRequest::Unpush | UpdateRequest::Obsolete, UpdateStatus::Testing) => {
                Some(TagKind::Testing)
            }
            (UpdateRequest::Unpush | UpdateRequest::Obsolete, UpdateStatus::Stable) => {
                Some(TagKind::Stable)
            }
            _ => None,
        };

        Ok(kind)
    }

    /// Repositories that must be composed to publish this update
    pub fn repos(&self, resume: bool) -> Vec<String> {
        let release = &self.release;
        if resume {
            return vec![release.stable_repo(), release.testing_repo()];
        }

        match (self.request, self.status) {
            (Some(UpdateRequest::Stable), UpdateStatus::Testing) => {
                vec![release.stable_repo(), release.testing_repo()]
            }
            (Some(UpdateRequest::Stable), _) => vec![release.stable_repo()],
            (Some(UpdateRequest::Testing), _) => vec![release.testing_repo()],
            (Some(UpdateRequest::Obsolete), UpdateStatus::Testing) => vec![release.testing_repo()],
            (Some(UpdateRequest::Obsolete), UpdateStatus::Stable) => vec![release.stable_repo()],
            _ => Vec::new(),
        }
    }

    /// Carries out the pending request on the update record itself
    ///
    /// Clears the request and moves the status to the state the request
    /// targeted. Does nothing when no request is pending.
    pub fn request_complete(&mut self) {
        let Some(request) = self.request.take() else {
            return;
        };

        self.status = match request {
            UpdateRequest::Testing => UpdateStatus::Testing,
            UpdateRequest::Stable => UpdateStatus::Stable,
            UpdateRequest::Obsolete => UpdateStatus::Obsolete,
            UpdateRequest::Unpush => UpdateStatus::Pending,
        };

        if matches!(request, UpdateRequest::Testing | UpdateRequest::Stable) {
            self.date_pushed = Some(chrono::Utc::now());
        }
    }
}
