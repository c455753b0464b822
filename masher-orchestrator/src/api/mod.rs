//! API Module
//!
//! HTTP API layer for the masher daemon.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod push;

use axum::{
    Router,
    routing::{get, post},
};
use masher_runner::repository::UpdateRepository;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::PushOrchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PushOrchestrator>,
    pub updates: Arc<dyn UpdateRepository>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Push endpoints
        .route("/api/push", post(push::submit_push))
        .route("/api/mash", post(push::mash_repos))
        .route("/api/status", get(push::get_status))
        .route("/api/lastlog", get(push::get_last_log))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use masher_core::domain::push::{PushProgress, PushReport, PushRequest};
    use masher_core::domain::update::{Build, Release, Update, UpdateRequest, UpdateStatus};
    use masher_core::dto::push::{MasherStatus, PushAccepted};
    use masher_runner::PushExecutor;
    use masher_runner::repository::JsonUpdateRepository;
    use masher_runner::service::TracingNotifier;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tower::util::ServiceExt;

    /// Executor recording requests and finishing immediately
    #[derive(Default)]
    struct RecordingExecutor {
        requests: Mutex<Vec<PushRequest>>,
    }

    #[async_trait]
    impl PushExecutor for RecordingExecutor {
        async fn execute(
            &self,
            request: PushRequest,
            _progress: watch::Sender<PushProgress>,
        ) -> PushReport {
            let id = request.id;
            self.requests.lock().unwrap().push(request);
            PushReport {
                success: true,
                errors: Vec::new(),
                ..PushReport::failed(id, "")
            }
        }
    }

    fn update(title: &str) -> Update {
        Update {
            title: title.to_string(),
            release: Release {
                name: "F8".to_string(),
                long_name: "Fedora 8".to_string(),
                dist_tag: "dist-f8".to_string(),
                version: "8".to_string(),
            },
            builds: vec![Build {
                nvr: title.to_string(),
                inherited: false,
            }],
            request: Some(UpdateRequest::Testing),
            status: UpdateStatus::Pending,
            bugs: Vec::new(),
            notes: String::new(),
            comments: Vec::new(),
            date_pushed: None,
        }
    }

    async fn setup() -> (Router, Arc<RecordingExecutor>, TempDir) {
        let dir = TempDir::new().unwrap();
        let updates = Arc::new(JsonUpdateRepository::new(dir.path().join("updates.json")));
        updates.save(&update("foo-1.0-1.fc8")).await.unwrap();

        let executor = Arc::new(RecordingExecutor::default());
        let orchestrator =
            PushOrchestrator::new(executor.clone(), Arc::new(TracingNotifier), "releng@x");

        let router = create_router(AppState {
            orchestrator,
            updates,
        });
        (router, executor, dir)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _, _dir) = setup().await;
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mashing"], false);
    }

    #[tokio::test]
    async fn test_submit_push_resolves_titles() {
        let (router, executor, _dir) = setup().await;

        let resp = router
            .oneshot(post_json(
                "/api/push",
                serde_json::json!({ "titles": ["foo-1.0-1.fc8"] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let accepted: PushAccepted = body_json(resp).await;
        assert_eq!(accepted.id, 1);
        assert!(accepted.started);

        for _ in 0..100 {
            if !executor.requests.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let requests = executor.requests.lock().unwrap();
        assert_eq!(requests[0].updates[0].title, "foo-1.0-1.fc8");
        assert!(!requests[0].resume);
    }

    #[tokio::test]
    async fn test_unknown_title_is_not_found() {
        let (router, _, _dir) = setup().await;

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/push",
                serde_json::json!({ "titles": ["missing-1.0-1"] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Resuming tolerates titles that no longer resolve
        let resp = router
            .oneshot(post_json(
                "/api/push",
                serde_json::json!({ "titles": ["missing-1.0-1"], "resume": true }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_submissions_are_rejected() {
        let (router, _, _dir) = setup().await;

        let resp = router
            .clone()
            .oneshot(post_json("/api/push", serde_json::json!({ "titles": [] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .oneshot(post_json("/api/mash", serde_json::json!({ "repos": [" "] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mash_and_status() {
        let (router, _, _dir) = setup().await;

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/mash",
                serde_json::json!({ "repos": ["f8-updates"] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let status: MasherStatus = body_json(resp).await;
        assert!(status.text.starts_with("Currently Mashing: "));
        assert_eq!(status.queued, 0);
    }
}
