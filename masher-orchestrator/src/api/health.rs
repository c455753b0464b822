//! Health Check API Handler

use axum::{Json, extract::State};

use crate::api::AppState;

/// GET /health
/// Liveness check, also reporting whether a push is running
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "mashing": state.orchestrator.running().is_some(),
    }))
}
