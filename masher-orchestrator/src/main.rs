use anyhow::Context;
use masher_runner::{MasherConfig, PushServices, StandardPushExecutor};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod service;

use api::AppState;
use service::PushOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "masher_orchestrator=info,masher_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Masher daemon...");

    let config = match MasherConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{}, using default configuration", e);
            MasherConfig::default()
        }
    };
    config.validate()?;

    for dir in [&config.mashed_dir, &config.mashed_stage_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    tracing::info!(
        "Mashing into {} (stage: {})",
        config.mashed_dir.display(),
        config.mashed_stage_dir.display()
    );

    // Stops pushes waiting on mirror propagation at shutdown
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let report_to = config.releng_list.clone();
    let services = Arc::new(PushServices::from_config(config).with_sync_cancel(cancel_rx));
    let executor = Arc::new(StandardPushExecutor::new(services.clone()));
    let orchestrator = PushOrchestrator::new(executor, services.notifier.clone(), report_to);

    let app = api::create_router(AppState {
        orchestrator,
        updates: services.updates.clone(),
    });

    // Get bind address
    let addr = std::env::var("MASHER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            tracing::info!("Shutting down");
            let _ = cancel_tx.send(true);
        })
        .await
        .context("Server error")?;

    Ok(())
}
