//! Push execution
//!
//! The orchestrator hands every dequeued request to a [`PushExecutor`] and
//! receives a [`PushReport`] back. The standard executor runs a
//! [`PushPipeline`] against the services wired up from configuration.

use async_trait::async_trait;
use masher_core::domain::push::{PushProgress, PushReport, PushRequest};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::MasherConfig;
use crate::pipeline::PushPipeline;
use crate::repository::{
    BuildTagRepository, HttpBuildTagRepository, HttpMirrorRepository, JsonUpdateRepository,
    MirrorRepository, UpdateRepository,
};
use crate::service::{
    MashCompositor, MetadataGenerator, NotificationSink, RepoCompositor, TracingNotifier,
    UpdateInfoGenerator, WebhookNotifier,
};

/// Everything a push talks to
pub struct PushServices {
    pub config: MasherConfig,
    pub tags: Arc<dyn BuildTagRepository>,
    pub updates: Arc<dyn UpdateRepository>,
    pub mirror: Arc<dyn MirrorRepository>,
    pub compositor: Arc<dyn RepoCompositor>,
    pub metadata: Arc<dyn MetadataGenerator>,
    pub notifier: Arc<dyn NotificationSink>,
    /// Sending `true` stops a push waiting on the mirror
    pub sync_cancel: Option<watch::Receiver<bool>>,
}

impl PushServices {
    /// Wires the HTTP, filesystem and process backed implementations
    pub fn from_config(config: MasherConfig) -> Self {
        let notifier: Arc<dyn NotificationSink> = match &config.notify_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.from_email.clone())),
            None => Arc::new(TracingNotifier),
        };

        Self {
            tags: Arc::new(HttpBuildTagRepository::new(
                config.buildsys_url.clone(),
                config.task_poll_interval,
            )),
            updates: Arc::new(JsonUpdateRepository::new(config.updates_db.clone())),
            mirror: Arc::new(HttpMirrorRepository::new()),
            compositor: Arc::new(MashCompositor::new(
                config.mash_command.clone(),
                config.comps_dir.clone(),
                config.comps_refresh_command.clone(),
            )),
            metadata: Arc::new(UpdateInfoGenerator::new()),
            notifier,
            sync_cancel: None,
            config,
        }
    }

    pub fn with_sync_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.sync_cancel = Some(cancel);
        self
    }
}

/// Runs push requests to completion
#[async_trait]
pub trait PushExecutor: Send + Sync {
    /// Executes `request`, publishing progress snapshots on `progress`
    ///
    /// Always yields a report; failures are described inside it.
    async fn execute(
        &self,
        request: PushRequest,
        progress: watch::Sender<PushProgress>,
    ) -> PushReport;
}

/// Standard implementation of PushExecutor
pub struct StandardPushExecutor {
    services: Arc<PushServices>,
}

impl StandardPushExecutor {
    pub fn new(services: Arc<PushServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PushExecutor for StandardPushExecutor {
    async fn execute(
        &self,
        request: PushRequest,
        progress: watch::Sender<PushProgress>,
    ) -> PushReport {
        PushPipeline::new(request, Arc::clone(&self.services), progress)
            .run()
            .await
    }
}
