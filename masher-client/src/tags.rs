//! Tag-related build system endpoints

use crate::error::Result;
use crate::{BuildSystemClient, handle_response};
use masher_core::domain::buildsys::{TagMutation, TaskId};
use serde::{Deserialize, Serialize};

/// A build carrying a tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedBuild {
    pub nvr: String,
}

/// A batch of tag mutations submitted in one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Multicall {
    pub calls: Vec<TagMutation>,
    /// Apply the mutation even if the destination tag is locked
    pub force: bool,
}

/// Outcome of one call inside a multicall batch
///
/// Accepted calls carry the id of the task the build system queued for
/// them; rejected calls carry a fault string instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub task_id: Option<TaskId>,
    pub fault: Option<String>,
}

impl BuildSystemClient {
    // =============================================================================
    // Tag Queries
    // =============================================================================

    /// List every build currently carrying `tag`
    pub async fn list_tagged(&self, tag: &str) -> Result<Vec<TaggedBuild>> {
        let url = format!("{}/api/tags/{}/builds", self.base_url, tag);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Tag Mutations
    // =============================================================================

    /// Submit a batch of tag mutations as a single multicall
    ///
    /// The returned results are positionally aligned with `mutations`.
    pub async fn multicall(&self, mutations: &[TagMutation]) -> Result<Vec<CallResult>> {
        let url = format!("{}/api/multicall", self.base_url);
        tracing::debug!("Submitting multicall with {} call(s)", mutations.len());

        let response = self
            .client
            .post(&url)
            .json(&Multicall {
                calls: mutations.to_vec(),
                force: true,
            })
            .send()
            .await?;

        handle_response(response).await
    }
}
