//! Push API Handlers
//!
//! HTTP endpoints for submitting pushes and inspecting the masher.

use axum::{Json, extract::State};
use masher_core::dto::push::{LastLog, MashRepos, MasherStatus, PushAccepted, SubmitPush};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::push_service;

/// POST /api/push
/// Queue a push of updates by title
pub async fn submit_push(
    State(state): State<AppState>,
    Json(req): Json<SubmitPush>,
) -> ApiResult<Json<PushAccepted>> {
    tracing::info!(
        "Push requested for {} update(s) (resume={})",
        req.titles.len(),
        req.resume
    );

    let accepted =
        push_service::submit_push(&state.orchestrator, state.updates.as_ref(), req).await?;
    Ok(Json(accepted))
}

/// POST /api/mash
/// Queue a composition of bare repositories
pub async fn mash_repos(
    State(state): State<AppState>,
    Json(req): Json<MashRepos>,
) -> ApiResult<Json<PushAccepted>> {
    tracing::info!("Mash requested for {:?}", req.repos);

    let accepted = push_service::mash_repos(&state.orchestrator, req)?;
    Ok(Json(accepted))
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<MasherStatus> {
    Json(state.orchestrator.status())
}

/// GET /api/lastlog
/// Log of the most recently completed push
pub async fn get_last_log(State(state): State<AppState>) -> Json<LastLog> {
    Json(state.orchestrator.last_log().await)
}
