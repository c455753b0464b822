//! Masher daemon API endpoints

use crate::error::Result;
use crate::{MasherClient, handle_response};
use masher_core::dto::push::{LastLog, MashRepos, MasherStatus, PushAccepted, SubmitPush};

impl MasherClient {
    /// Queue a push of the given update titles
    pub async fn submit_push(&self, titles: Vec<String>, resume: bool) -> Result<PushAccepted> {
        let url = format!("{}/api/push", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitPush { titles, resume })
            .send()
            .await?;

        handle_response(response).await
    }

    /// Queue a composition of bare repositories
    pub async fn mash_repos(&self, repos: Vec<String>) -> Result<PushAccepted> {
        let url = format!("{}/api/mash", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&MashRepos { repos })
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch the orchestrator status snapshot
    pub async fn status(&self) -> Result<MasherStatus> {
        let url = format!("{}/api/status", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Fetch the log of the most recently completed push
    pub async fn last_log(&self) -> Result<LastLog> {
        let url = format!("{}/api/lastlog", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }
}
