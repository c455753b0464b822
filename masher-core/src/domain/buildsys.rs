//! Build system domain types
//!
//! Tag mutations and the asynchronous tasks the build system creates for them.

use serde::{Deserialize, Serialize};

/// Identifier of an asynchronous build system task
pub type TaskId = u64;

/// A single tag mutation issued as part of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TagMutation {
    /// Add `tag` to the build without removing any other tag
    TagBuild { tag: String, nvr: String },
    /// Transfer the build from `from_tag` to `to_tag`
    MoveBuild {
        from_tag: String,
        to_tag: String,
        nvr: String,
    },
}

impl TagMutation {
    pub fn nvr(&self) -> &str {
        match self {
            TagMutation::TagBuild { nvr, .. } | TagMutation::MoveBuild { nvr, .. } => nvr,
        }
    }
}

/// State of a build system task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Free,
    Open,
    Assigned,
    Closed,
    Canceled,
    Failed,
}

impl TaskState {
    /// Whether the task will never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Closed | TaskState::Canceled | TaskState::Failed
        )
    }

    /// Whether the task finished without succeeding
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskState::Canceled | TaskState::Failed)
    }
}

/// Task status as reported by the build system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub state: TaskState,
}
