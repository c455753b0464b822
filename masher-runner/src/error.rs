//! Push error taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for push pipeline stages
pub type Result<T> = std::result::Result<T, PushError>;

/// Errors that abort a push pipeline
#[derive(Debug, Error)]
pub enum PushError {
    /// A resumption marker from an earlier push is still present
    #[error("Previous mash not complete! Either resume the last push, or remove {}", .marker.display())]
    PreviousPushIncomplete { marker: PathBuf },

    /// Build system state disagrees with the update records
    #[error("{} build(s) failed the tag consistency check", .0.len())]
    Inconsistent(Vec<String>),

    /// One or more tag mutation tasks did not succeed
    #[error("Failed to move builds: {0}")]
    TaskFailed(String),

    /// The composition tool exited non-zero
    #[error("Mash failed for {repo} (output in {})", .log.display())]
    ComposeFailed { repo: String, log: PathBuf },

    /// A composed tree failed a pre-publish check
    #[error("Publish validation failed: {0}")]
    PublishValidation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
