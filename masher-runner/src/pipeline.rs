//! Push pipeline
//!
//! Executes one push request through its stages, strictly in order:
//!
//! 1. locking: acquire the resumption marker (or adopt it when resuming)
//! 2. checking: verify every build carries the tag its request expects
//! 3. moving: batch the tag mutations and wait for the build system tasks
//! 4. mashing: compose every target repository
//! 5. completing requests: finalize update records, collect the testing digest
//! 6. generating metadata: write update advisories into each composed tree
//! 7. publishing: validate, relocate and link each tree
//! 8. caching repodata: snapshot the new repodata for the next push
//! 9. syncing: wait for the master mirror to serve the new metadata
//! 10. notifying: comments, update notices and the testing digest
//!
//! The first error aborts the remaining stages. The marker is removed only
//! when the whole push succeeded, so a failed push can be resumed.

use anyhow::anyhow;
use masher_core::domain::buildsys::TagMutation;
use masher_core::domain::push::{PushId, PushPhase, PushProgress, PushReport, PushRequest, TagAction};
use masher_core::domain::update::{Update, UpdateRequest, UpdateStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{PushError, Result};
use crate::execution::PushServices;
use crate::marker::{MarkerState, PushMarker};
use crate::service::metadata::UPDATEINFO_JSON;
use crate::service::notify::{self, TestingDigest};
use crate::service::sync::{self, MirrorSyncWaiter, SyncOutcome};
use crate::service::RepoPublisher;

/// A single running push
pub struct PushPipeline {
    id: PushId,
    services: Arc<PushServices>,
    marker: PushMarker,
    publisher: RepoPublisher,
    resume: bool,
    /// Keyed by title
    updates: BTreeMap<String, Update>,
    repos: BTreeSet<String>,
    actions: Vec<TagAction>,
    /// Repository name -> directory the tree was composed (and later published) in
    mashed_repos: BTreeMap<String, PathBuf>,
    errors: Vec<String>,
    testing_digest: TestingDigest,
    log_path: Option<PathBuf>,
    /// Suffix of every directory and log this push creates
    stamp: String,
    phase: PushPhase,
    phase_started: Instant,
    progress: watch::Sender<PushProgress>,
}

impl PushPipeline {
    pub fn new(
        request: PushRequest,
        services: Arc<PushServices>,
        progress: watch::Sender<PushProgress>,
    ) -> Self {
        let marker = PushMarker::new(services.config.marker_path());
        let publisher = RepoPublisher::new(services.config.clone());

        Self {
            id: request.id,
            marker,
            publisher,
            resume: request.resume,
            updates: request
                .updates
                .into_iter()
                .map(|u| (u.title.clone(), u))
                .collect(),
            repos: request.repos,
            actions: Vec::new(),
            mashed_repos: BTreeMap::new(),
            errors: Vec::new(),
            testing_digest: TestingDigest::new(),
            log_path: None,
            stamp: chrono::Utc::now().format("%y%m%d.%H%M%S").to_string(),
            phase: PushPhase::Queued,
            phase_started: Instant::now(),
            progress,
            services,
        }
    }

    /// Runs every stage and reports the outcome
    ///
    /// Never fails; errors end up in the report.
    pub async fn run(mut self) -> PushReport {
        info!("Starting push #{}", self.id);
        let started = Instant::now();

        match self.execute().await {
            Ok(()) => {}
            // Already recorded one by one
            Err(PushError::Inconsistent(_)) => {}
            Err(e) => self.error_log(e.to_string()),
        }

        if self.errors.is_empty() {
            if let Err(e) = self.marker.release().await {
                self.error_log(format!("Failed to remove push marker: {}", e));
            }
        }

        let success = self.errors.is_empty();
        self.enter(if success {
            PushPhase::Done
        } else {
            PushPhase::Failed
        });

        info!(
            "Push #{} {} in {:?}",
            self.id,
            if success { "succeeded" } else { "failed" },
            started.elapsed()
        );

        self.into_report(success).await
    }

    async fn execute(&mut self) -> Result<()> {
        self.enter(PushPhase::Locking);
        self.lock().await?;
        self.find_repos();

        if !self.resume {
            self.enter(PushPhase::Checking);
            self.check_consistency().await?;

            if !self.updates.is_empty() {
                self.enter(PushPhase::Moving);
                self.move_builds().await?;
            }
        }

        self.enter(PushPhase::Mashing);
        self.mash().await?;

        self.enter(PushPhase::CompletingRequests);
        self.complete_requests().await?;

        self.enter(PushPhase::GeneratingMetadata);
        self.generate_metadata().await?;

        self.enter(PushPhase::Publishing);
        self.publish().await?;

        self.enter(PushPhase::CachingRepodata);
        self.cache_repodata().await?;

        self.enter(PushPhase::Syncing);
        self.wait_for_sync().await?;

        self.enter(PushPhase::Notifying);
        self.notify().await?;

        Ok(())
    }

    async fn lock(&mut self) -> Result<()> {
        let config = &self.services.config;
        for dir in [&config.mashed_dir, &config.mashed_stage_dir] {
            if !dir.is_dir() {
                info!("Creating {}", dir.display());
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let titles: Vec<String> = self.updates.keys().cloned().collect();
        match self.marker.acquire(&titles, self.resume).await? {
            MarkerState::Created => {}
            MarkerState::Resumed(titles) => {
                for title in titles {
                    if self.updates.contains_key(&title) {
                        continue;
                    }
                    match self.services.updates.find_by_title(&title).await? {
                        Some(update) => {
                            self.updates.insert(title, update);
                        }
                        None => warn!("Cannot find update {} from push marker; skipping", title),
                    }
                }
                info!("Resuming push of {} update(s)", self.updates.len());
            }
        }

        Ok(())
    }

    fn find_repos(&mut self) {
        for update in self.updates.values() {
            self.repos.extend(update.repos(self.resume));
        }
        debug!("Repositories to mash: {:?}", self.repos);
    }

    /// Collects every tag inconsistency before failing
    async fn check_consistency(&mut self) -> Result<()> {
        let mut tagged: HashMap<String, HashSet<String>> = HashMap::new();
        let mut problems = Vec::new();

        for update in self.updates.values() {
            let kind = match update.expected_tag() {
                Ok(Some(kind)) => kind,
                Ok(None) => continue,
                Err(msg) => {
                    problems.push(msg);
                    continue;
                }
            };

            let tag = update.release.tag(kind);
            if !tagged.contains_key(&tag) {
                let builds = self.services.tags.list_tagged(&tag).await?;
                tagged.insert(tag.clone(), builds);
            }

            let builds = &tagged[&tag];
            for build in &update.builds {
                if !builds.contains(&build.nvr) {
                    problems.push(format!("{} not tagged as {}", build.nvr, tag));
                }
            }
        }

        if problems.is_empty() {
            return Ok(());
        }

        for problem in &problems {
            self.error_log(problem.clone());
        }
        Err(PushError::Inconsistent(problems))
    }

    /// Issues every tag move of the batch as one call
    ///
    /// Moves that already happened are left in place when a task fails.
    async fn move_builds(&mut self) -> Result<()> {
        let mut mutations = Vec::new();

        for update in self.updates.values() {
            let Some(to_tag) = update.destination_tag() else {
                continue;
            };
            let from_tag = update.current_tag();

            for build in &update.builds {
                let mutation = if build.inherited {
                    TagMutation::TagBuild {
                        tag: to_tag.clone(),
                        nvr: build.nvr.clone(),
                    }
                } else {
                    TagMutation::MoveBuild {
                        from_tag: from_tag.clone(),
                        to_tag: to_tag.clone(),
                        nvr: build.nvr.clone(),
                    }
                };
                mutations.push(mutation);

                let action = TagAction {
                    nvr: build.nvr.clone(),
                    from_tag: from_tag.clone(),
                    to_tag: to_tag.clone(),
                };
                info!("{}", action);
                self.actions.push(action);
            }
        }
        self.publish_progress();

        if mutations.is_empty() {
            return Ok(());
        }

        let tasks = self
            .services
            .tags
            .batch_mutate(&mutations)
            .await
            .map_err(|e| PushError::TaskFailed(format!("{:#}", e)))?;

        let ok = self
            .services
            .tags
            .await_all(&tasks)
            .await
            .map_err(|e| PushError::TaskFailed(format!("{:#}", e)))?;

        if !ok {
            return Err(PushError::TaskFailed(format!(
                "one or more of {} tag task(s) failed",
                tasks.len()
            )));
        }

        Ok(())
    }

    async fn mash(&mut self) -> Result<()> {
        let services = Arc::clone(&self.services);
        let config = &services.config;

        if let Err(e) = services.compositor.refresh_groups().await {
            warn!("Failed to refresh group metadata: {:#}", e);
        }

        let mash_conf = config
            .effective_mash_conf()
            .ok_or_else(|| anyhow!("Cannot find mash config {}", config.mash_conf.display()))?;

        for repo in self.repos.clone() {
            let mashdir = config.mashed_dir.join(format!("{}-{}", repo, self.stamp));
            tokio::fs::create_dir_all(&mashdir).await?;

            let started = Instant::now();
            let output = services
                .compositor
                .compose(&mashdir, &mash_conf, &config.comps_path(&repo), &repo)
                .await?;
            info!("Mashed {} in {:?}", repo, started.elapsed());

            if !output.success() {
                let log = config
                    .mashed_dir
                    .join(format!("mash-failed-{}-{}", repo, self.stamp));
                tokio::fs::write(&log, format!("{}{}", output.stdout, output.stderr)).await?;
                self.log_path = Some(log.clone());
                return Err(PushError::ComposeFailed { repo, log });
            }

            let log = mashdir.join("mash.out");
            tokio::fs::write(&log, &output.stdout).await?;
            self.log_path = Some(log);
            self.mashed_repos.insert(repo, mashdir);
        }

        Ok(())
    }

    async fn complete_requests(&mut self) -> Result<()> {
        for update in self.updates.values_mut() {
            let to_digest = match update.request {
                Some(request) => {
                    update.request_complete();
                    self.services.updates.save(update).await?;
                    request == UpdateRequest::Testing
                }
                // Finalized before the push being resumed crashed
                None => self.resume && update.status == UpdateStatus::Testing,
            };

            if to_digest {
                notify::add_to_digest(&mut self.testing_digest, update);
            }
        }
        Ok(())
    }

    async fn generate_metadata(&mut self) -> Result<()> {
        let config = &self.services.config;
        let updates: Vec<Update> = self.updates.values().cloned().collect();

        for (repo, mashdir) in &self.mashed_repos {
            let cached = config
                .repodata_cache(repo)
                .join(&config.primary_arch)
                .join(UPDATEINFO_JSON);
            let prior = cached.exists().then_some(cached);

            self.services
                .metadata
                .generate(repo, &mashdir.join(repo), prior.as_deref(), &updates)
                .await?;
        }
        Ok(())
    }

    async fn publish(&mut self) -> Result<()> {
        for (repo, mashdir) in self.mashed_repos.clone() {
            let published = self.publisher.publish(&repo, &mashdir).await?;

            let moved_log = self
                .log_path
                .as_ref()
                .and_then(|log| log.strip_prefix(&mashdir).ok())
                .map(|rel| published.join(rel));
            if moved_log.is_some() {
                self.log_path = moved_log;
            }
            self.mashed_repos.insert(repo, published);
        }
        Ok(())
    }

    async fn cache_repodata(&mut self) -> Result<()> {
        for (repo, mashdir) in &self.mashed_repos {
            self.publisher.cache_repodata(repo, mashdir).await?;
        }
        Ok(())
    }

    async fn wait_for_sync(&mut self) -> Result<()> {
        let Some(update) = self.updates.values().next() else {
            debug!("No updates in masher; skipping wait_for_sync");
            return Ok(());
        };
        let release = update.release.clone();
        let config = &self.services.config;

        let repomd = config
            .mashed_dir
            .join(release.stable_repo())
            .join(&config.primary_arch)
            .join("repodata")
            .join("repomd.xml");
        if !repomd.exists() {
            error!("Cannot find local repomd: {}", repomd.display());
            return Ok(());
        }

        let checksum = sync::file_checksum(&repomd).await?;
        let mut waiter =
            MirrorSyncWaiter::new(Arc::clone(&self.services.mirror), config.sync_interval);
        if let Some(cancel) = &self.services.sync_cancel {
            waiter = waiter.with_cancellation(cancel.clone());
        }

        match waiter
            .wait_for_checksum_match(&checksum, &config.master_repomd, &release.version)
            .await
        {
            SyncOutcome::Matched => Ok(()),
            SyncOutcome::Cancelled => Err(anyhow!("Stopped waiting for mirror sync").into()),
        }
    }

    async fn notify(&mut self) -> Result<()> {
        let config = &self.services.config;
        let notifier = &self.services.notifier;

        for update in self.updates.values() {
            let comment = match update.status {
                UpdateStatus::Testing => "This update has been pushed to testing",
                UpdateStatus::Stable => "This update has been pushed to stable",
                UpdateStatus::Obsolete => "This update has been obsoleted",
                UpdateStatus::Pending => "This update has been unpushed",
            };
            self.services.updates.add_comment(&update.title, comment).await?;
            notifier.comment_on_bugs(update, comment).await?;

            if update.status == UpdateStatus::Stable {
                let (subject, body) = notify::update_notice(update);
                notifier
                    .send_mail(&config.announce_list, &subject, &body)
                    .await?;
            }
        }

        for (release, notices) in &self.testing_digest {
            let (subject, body) = notify::render_digest(release, notices);
            notifier
                .send_mail(&config.test_announce_list, &subject, &body)
                .await?;
        }

        Ok(())
    }

    fn error_log(&mut self, msg: String) {
        error!("{}", msg);
        self.errors.push(msg);
    }

    fn enter(&mut self, phase: PushPhase) {
        if self.phase != PushPhase::Queued {
            debug!("Push #{} {} took {:?}", self.id, self.phase, self.phase_started.elapsed());
        }
        info!("Push #{}: {}", self.id, phase);
        self.phase = phase;
        self.phase_started = Instant::now();
        self.publish_progress();
    }

    fn publish_progress(&self) {
        self.progress.send_replace(PushProgress {
            id: self.id,
            phase: self.phase,
            repos: self.repos.iter().cloned().collect(),
            updates: self
                .updates
                .values()
                .map(|u| {
                    let request = u
                        .request
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "None".to_string());
                    (u.title.clone(), request)
                })
                .collect(),
            actions: self.actions.clone(),
        });
    }

    async fn into_report(self, success: bool) -> PushReport {
        let log_output = match (&self.log_path, success) {
            (Some(path), false) => tokio::fs::read_to_string(path).await.ok(),
            _ => None,
        };

        PushReport {
            id: self.id,
            success,
            errors: self.errors,
            actions: self.actions,
            repos: self.repos.into_iter().collect(),
            log_path: self.log_path,
            log_output,
            finished_at: chrono::Utc::now(),
        }
    }
}
