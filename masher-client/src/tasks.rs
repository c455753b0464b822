//! Task-related build system endpoints

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::{BuildSystemClient, handle_response};
use masher_core::domain::buildsys::{TaskId, TaskInfo, TaskState};

impl BuildSystemClient {
    /// Get the current state of a task
    pub async fn task_info(&self, task_id: TaskId) -> Result<TaskInfo> {
        let url = format!("{}/api/tasks/{}", self.base_url, task_id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Block until every task has reached a terminal state
    ///
    /// Polls all unfinished tasks every `poll_interval`. There is no overall
    /// deadline. Returns the final state of every task.
    pub async fn wait_for_tasks(
        &self,
        tasks: &[TaskId],
        poll_interval: Duration,
    ) -> Result<BTreeMap<TaskId, TaskState>> {
        poll_until_terminal(tasks, poll_interval, |task_id| async move {
            Ok(self.task_info(task_id).await?.state)
        })
        .await
    }
}

/// Polls `state_of` for every unfinished task until none is left running
pub(crate) async fn poll_until_terminal<F, Fut>(
    tasks: &[TaskId],
    poll_interval: Duration,
    mut state_of: F,
) -> Result<BTreeMap<TaskId, TaskState>>
where
    F: FnMut(TaskId) -> Fut,
    Fut: Future<Output = Result<TaskState>>,
{
    let mut finished = BTreeMap::new();
    let mut pending: Vec<TaskId> = tasks.to_vec();

    while !pending.is_empty() {
        let mut still_running = Vec::with_capacity(pending.len());

        for task_id in pending {
            let state = state_of(task_id).await?;
            if state.is_terminal() {
                tracing::debug!("Task {} finished: {:?}", task_id, state);
                finished.insert(task_id, state);
            } else {
                still_running.push(task_id);
            }
        }

        pending = still_running;
        if !pending.is_empty() {
            tracing::debug!("Waiting on {} task(s)", pending.len());
            tokio::time::sleep(poll_interval).await;
        }
    }

    Ok(finished)
}
