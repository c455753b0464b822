//! Build tag repository
//!
//! Handles tag queries and batched tag mutations against the build system,
//! and blocks until the asynchronous tasks behind a batch complete.

use anyhow::{Context, Result};
use async_trait::async_trait;
use masher_client::{BuildSystemClient, CallResult, ClientError};
use masher_core::domain::buildsys::{TagMutation, TaskId, TaskState};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, error};

/// Repository trait for build system tag operations
#[async_trait]
pub trait BuildTagRepository: Send + Sync {
    /// Lists the NVRs of every build carrying `tag`
    async fn list_tagged(&self, tag: &str) -> Result<HashSet<String>>;

    /// Issues all mutations as one multi-operation call
    ///
    /// Every call must be accepted by the build system's task queue;
    /// the returned task ids are aligned with `mutations`.
    async fn batch_mutate(&self, mutations: &[TagMutation]) -> Result<Vec<TaskId>>;

    /// Blocks until every task reaches a terminal state
    ///
    /// Returns `false` if any task failed.
    async fn await_all(&self, tasks: &[TaskId]) -> Result<bool>;
}

/// HTTP implementation of BuildTagRepository
pub struct HttpBuildTagRepository {
    client: BuildSystemClient,
    poll_interval: Duration,
}

impl HttpBuildTagRepository {
    /// Creates a new HTTP build tag repository
    ///
    /// # Arguments
    /// * `buildsys_url` - Base URL of the build system API
    /// * `poll_interval` - Delay between task status polls
    pub fn new(buildsys_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client: BuildSystemClient::new(buildsys_url),
            poll_interval,
        }
    }
}

#[async_trait]
impl BuildTagRepository for HttpBuildTagRepository {
    async fn list_tagged(&self, tag: &str) -> Result<HashSet<String>> {
        let builds = self
            .client
            .list_tagged(tag)
            .await
            .with_context(|| format!("Failed to list builds tagged {}", tag))?;

        Ok(builds.into_iter().map(|b| b.nvr).collect())
    }

    async fn batch_mutate(&self, mutations: &[TagMutation]) -> Result<Vec<TaskId>> {
        let results = self
            .client
            .multicall(mutations)
            .await
            .context("Failed to submit tag multicall")?;

        let tasks = task_ids(mutations, results)?;
        debug!("Build system accepted {} tag task(s)", tasks.len());
        Ok(tasks)
    }

    async fn await_all(&self, tasks: &[TaskId]) -> Result<bool> {
        let states = self
            .client
            .wait_for_tasks(tasks, self.poll_interval)
            .await
            .context("Failed while waiting for tag tasks")?;

        let failed = failed_tasks(&states);

        for task_id in &failed {
            error!("{}", ClientError::TaskFailed(*task_id));
        }

        Ok(failed.is_empty())
    }
}

/// Pairs each mutation with the task the build system queued for it
///
/// The batch is rejected as a whole if any call faulted, if a call produced
/// no task, or if the result count does not match the call count.
fn task_ids(mutations: &[TagMutation], results: Vec<CallResult>) -> Result<Vec<TaskId>> {
    if results.len() != mutations.len() {
        anyhow::bail!(
            "Multicall returned {} result(s) for {} call(s)",
            results.len(),
            mutations.len()
        );
    }

    let mut tasks = Vec::with_capacity(results.len());
    for (mutation, result) in mutations.iter().zip(results) {
        match (result.task_id, result.fault) {
            (_, Some(fault)) => {
                error!("Build system rejected {:?}: {}", mutation, fault);
                return Err(ClientError::CallRejected {
                    nvr: mutation.nvr().to_string(),
                    fault,
                }
                .into());
            }
            (Some(task_id), None) => tasks.push(task_id),
            (None, None) => {
                anyhow::bail!("No task created for {}", mutation.nvr());
            }
        }
    }
    Ok(tasks)
}

fn failed_tasks(states: &BTreeMap<TaskId, TaskState>) -> Vec<TaskId> {
    states
        .iter()
        .filter(|(_, state)| state.is_failure())
        .map(|(id, _)| *id)
        .collect()
}
