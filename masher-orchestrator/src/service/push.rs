//! Push Service
//!
//! Turns API submissions into orchestrator requests.

use masher_core::dto::push::{MashRepos, PushAccepted, SubmitPush};
use masher_runner::repository::UpdateRepository;
use std::collections::BTreeSet;

use crate::service::orchestrator::PushOrchestrator;

/// Service error type
#[derive(Debug)]
pub enum PushServiceError {
    UpdateNotFound(String),
    ValidationError(String),
    StoreError(anyhow::Error),
}

impl From<anyhow::Error> for PushServiceError {
    fn from(err: anyhow::Error) -> Self {
        PushServiceError::StoreError(err)
    }
}

/// Resolves the titles of a submission and queues the push
///
/// Unknown titles are rejected unless resuming, where the update set comes
/// from the push marker and the submitted titles are only a hint.
pub async fn submit_push(
    orchestrator: &PushOrchestrator,
    updates: &dyn UpdateRepository,
    req: SubmitPush,
) -> Result<PushAccepted, PushServiceError> {
    if req.titles.is_empty() && !req.resume {
        return Err(PushServiceError::ValidationError(
            "At least one update title is required".to_string(),
        ));
    }

    let mut resolved = Vec::with_capacity(req.titles.len());
    for title in &req.titles {
        match updates.find_by_title(title).await? {
            Some(update) => resolved.push(update),
            None if req.resume => {
                tracing::warn!("Ignoring unknown update {} in resumed push", title)
            }
            None => return Err(PushServiceError::UpdateNotFound(title.clone())),
        }
    }

    let submitted = orchestrator.submit(resolved, BTreeSet::new(), req.resume);
    tracing::info!("Push #{} accepted", submitted.id);

    Ok(PushAccepted {
        id: submitted.id,
        started: submitted.started,
    })
}

/// Queues a composition of bare repositories
pub fn mash_repos(
    orchestrator: &PushOrchestrator,
    req: MashRepos,
) -> Result<PushAccepted, PushServiceError> {
    let repos: BTreeSet<String> = req
        .repos
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    if repos.is_empty() {
        return Err(PushServiceError::ValidationError(
            "At least one repository is required".to_string(),
        ));
    }

    let submitted = orchestrator.mash_tags(repos);
    Ok(PushAccepted {
        id: submitted.id,
        started: submitted.started,
    })
}
