//! Push Orchestrator
//!
//! Owns the FIFO queue of push requests and the single running slot. A push
//! starts only from `submit` (when idle) or from the completion handler (when
//! the running push finishes); both decide under the same lock, so at most
//! one push runs at a time. The push itself runs outside the lock.
//!
//! A finished push sends its report over a channel; a listener task feeds it
//! back into [`PushOrchestrator::on_complete`]. Every started push produces
//! exactly one report, including pushes whose task panicked.

use masher_core::domain::push::{PushId, PushProgress, PushReport, PushRequest};
use masher_core::domain::update::Update;
use masher_core::dto::push::{LastLog, MasherStatus};
use masher_runner::PushExecutor;
use masher_runner::service::NotificationSink;
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

const LOG_UNAVAILABLE: &str = "mashlog unavailable";

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub id: PushId,
    /// Whether the push started right away instead of queueing
    pub started: bool,
}

struct RunningPush {
    id: PushId,
    progress: watch::Receiver<PushProgress>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<PushRequest>,
    running: Option<RunningPush>,
    next_id: PushId,
    last_log: Option<PathBuf>,
}

pub struct PushOrchestrator {
    state: Mutex<QueueState>,
    executor: Arc<dyn PushExecutor>,
    notifier: Arc<dyn NotificationSink>,
    /// Recipient of the per-push operations report
    report_to: String,
    completions: mpsc::UnboundedSender<PushReport>,
}

impl PushOrchestrator {
    /// Creates the orchestrator and spawns its completion listener
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        executor: Arc<dyn PushExecutor>,
        notifier: Arc<dyn NotificationSink>,
        report_to: impl Into<String>,
    ) -> Arc<Self> {
        let report_to = report_to.into();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(listen_for_completions(weak.clone(), rx));

            Self {
                state: Mutex::new(QueueState::default()),
                executor,
                notifier,
                report_to,
                completions: tx,
            }
        })
    }

    /// Queues a push and starts it if nothing is running
    ///
    /// Never waits for the push itself.
    pub fn submit(&self, updates: Vec<Update>, repos: BTreeSet<String>, resume: bool) -> Submitted {
        let mut state = self.state.lock().unwrap();

        state.next_id += 1;
        let id = state.next_id;
        info!(
            "Queueing push #{} ({} update(s), {} repo(s), resume={})",
            id,
            updates.len(),
            repos.len(),
            resume
        );
        state
            .queue
            .push_back(PushRequest::new(id, updates, repos, resume));

        if state.running.is_none() {
            self.start_next(&mut state);
        }

        Submitted {
            id,
            started: state.running.as_ref().is_some_and(|r| r.id == id),
        }
    }

    /// Composes bare repositories without touching any update
    pub fn mash_tags(&self, repos: BTreeSet<String>) -> Submitted {
        self.submit(Vec::new(), repos, false)
    }

    /// Handles the report of the running push
    pub async fn on_complete(&self, report: PushReport) {
        {
            let mut state = self.state.lock().unwrap();

            match state.running.as_ref() {
                Some(running) if running.id == report.id => {}
                Some(running) => warn!(
                    "Completion of push #{} while push #{} is running",
                    report.id, running.id
                ),
                None => warn!("Completion of push #{} while idle", report.id),
            }

            state.last_log = report.log_path.clone();
            state.running = None;
            info!(
                "Push #{} finished ({})",
                report.id,
                if report.success { "success" } else { "failure" }
            );

            if !state.queue.is_empty() {
                self.start_next(&mut state);
            }
        }

        if let Err(e) = self
            .notifier
            .send_mail(&self.report_to, &report.subject(), &report.render())
            .await
        {
            error!("Failed to send masher report for push #{}: {:#}", report.id, e);
        }
    }

    /// Dequeues the head of the queue and spawns it
    ///
    /// Callers hold the state lock.
    fn start_next(&self, state: &mut QueueState) {
        let Some(request) = state.queue.pop_front() else {
            return;
        };

        let id = request.id;
        let (progress_tx, progress_rx) = watch::channel(PushProgress::queued(&request));
        state.running = Some(RunningPush {
            id,
            progress: progress_rx,
        });
        debug!("Starting push #{}", id);

        let executor = Arc::clone(&self.executor);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let task = tokio::spawn(async move { executor.execute(request, progress_tx).await });
            let report = match task.await {
                Ok(report) => report,
                Err(e) => {
                    error!("Push #{} aborted: {}", id, e);
                    PushReport::failed(id, format!("Push #{} aborted: {}", id, e))
                }
            };

            if completions.send(report).is_err() {
                error!("Completion listener gone; push #{} report dropped", id);
            }
        });
    }

    /// Human readable snapshot of the running push and the queue
    pub fn status(&self) -> MasherStatus {
        let state = self.state.lock().unwrap();

        let mut text = format!(
            "Currently Mashing: {}\n\n",
            if state.running.is_some() { "Yes" } else { "No" }
        );
        if let Some(running) = &state.running {
            text.push_str(&running.progress.borrow().to_string());
        }
        if !state.queue.is_empty() {
            text.push_str("\n[ Queue ]\n");
            for request in &state.queue {
                text.push_str(&request.queue_summary());
            }
        }

        MasherStatus {
            mashing: state.running.is_some(),
            queued: state.queue.len(),
            text,
        }
    }

    /// Log of the most recently completed push
    pub async fn last_log(&self) -> LastLog {
        let path = self.state.lock().unwrap().last_log.clone();

        let contents = match &path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    LOG_UNAVAILABLE.to_string()
                }
            },
            None => LOG_UNAVAILABLE.to_string(),
        };

        LastLog {
            path: path.map(|p| p.display().to_string()),
            contents,
        }
    }

    /// Id of the running push, if any
    pub fn running(&self) -> Option<PushId> {
        self.state.lock().unwrap().running.as_ref().map(|r| r.id)
    }
}

async fn listen_for_completions(
    orchestrator: Weak<PushOrchestrator>,
    mut completions: mpsc::UnboundedReceiver<PushReport>,
) {
    while let Some(report) = completions.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            debug!("Orchestrator dropped; stopping completion listener");
            return;
        };
        orchestrator.on_complete(report).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use masher_core::domain::push::PushPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    /// Executor whose pushes finish only when released
    struct GatedExecutor {
        gate: Semaphore,
        started: Mutex<Vec<PushId>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        log_path: Option<PathBuf>,
        panic_on: Option<PushId>,
    }

    impl GatedExecutor {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                started: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                log_path: None,
                panic_on: None,
            }
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn started(&self) -> Vec<PushId> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushExecutor for GatedExecutor {
        async fn execute(
            &self,
            request: PushRequest,
            progress: watch::Sender<PushProgress>,
        ) -> PushReport {
            self.started.lock().unwrap().push(request.id);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            progress.send_modify(|p| p.phase = PushPhase::Mashing);
            self.gate.acquire().await.unwrap().forget();
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(request.id) {
                panic!("push exploded");
            }

            PushReport {
                log_path: self.log_path.clone(),
                success: true,
                errors: Vec::new(),
                ..PushReport::failed(request.id, "")
            }
        }
    }

    #[derive(Default)]
    struct Mailbox {
        mails: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for Mailbox {
        async fn send_mail(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            self.mails
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }

        async fn comment_on_bugs(&self, _update: &Update, _comment: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn repos(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_first_submission_starts_and_rest_queue_in_order() {
        let executor = Arc::new(GatedExecutor::new());
        let mailbox = Arc::new(Mailbox::default());
        let orchestrator = PushOrchestrator::new(executor.clone(), mailbox.clone(), "releng@x");

        let first = orchestrator.mash_tags(repos(&["f8-updates"]));
        let second = orchestrator.mash_tags(repos(&["f8-updates-testing"]));
        let third = orchestrator.mash_tags(repos(&["f7-updates"]));

        assert!(first.started);
        assert!(!second.started);
        assert!(!third.started);
        assert_eq!((first.id, second.id, third.id), (1, 2, 3));
        assert_eq!(orchestrator.running(), Some(1));
        assert_eq!(orchestrator.status().queued, 2);

        executor.release(3);
        wait_until(|| mailbox.mails.lock().unwrap().len() == 3).await;

        assert_eq!(executor.started(), vec![1, 2, 3]);
        assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.running(), None);
        assert_eq!(orchestrator.status().queued, 0);
    }

    #[tokio::test]
    async fn test_at_most_one_push_runs_under_interleaving() {
        let executor = Arc::new(GatedExecutor::new());
        let mailbox = Arc::new(Mailbox::default());
        let orchestrator = PushOrchestrator::new(executor.clone(), mailbox.clone(), "releng@x");

        for i in 0..10 {
            orchestrator.mash_tags(repos(&[&format!("r{}", i)]));
            if i % 3 == 0 {
                executor.release(1);
                tokio::task::yield_now().await;
            }
        }
        executor.release(10);
        wait_until(|| mailbox.mails.lock().unwrap().len() == 10).await;

        assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(executor.started(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_status_renders_running_push_and_queue() {
        let executor = Arc::new(GatedExecutor::new());
        let orchestrator =
            PushOrchestrator::new(executor.clone(), Arc::new(Mailbox::default()), "releng@x");

        let idle = orchestrator.status();
        assert!(!idle.mashing);
        assert_eq!(idle.text, "Currently Mashing: No\n\n");

        orchestrator.mash_tags(repos(&["f8-updates"]));
        orchestrator.mash_tags(repos(&["f8-updates-testing"]));
        wait_until(|| orchestrator.status().text.contains("Mashing Repos")).await;

        let status = orchestrator.status();
        assert!(status.mashing);
        assert!(status.text.starts_with("Currently Mashing: Yes\n\n[ Mash Task #1 ]\n"));
        assert!(status.text.contains("Mashing Repos [\"f8-updates\"]"));
        assert!(status
            .text
            .ends_with("\n[ Queue ]\n  Mash repos\n  - f8-updates-testing\n"));

        executor.release(2);
    }

    #[tokio::test]
    async fn test_report_mailed_and_last_log_recorded() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("mash.out");
        std::fs::write(&log, "mash output").unwrap();

        let mut executor = GatedExecutor::new();
        executor.log_path = Some(log.clone());
        let executor = Arc::new(executor);
        let mailbox = Arc::new(Mailbox::default());
        let orchestrator = PushOrchestrator::new(executor.clone(), mailbox.clone(), "releng@x");

        assert_eq!(orchestrator.last_log().await.contents, LOG_UNAVAILABLE);

        orchestrator.mash_tags(repos(&["f8-updates"]));
        executor.release(1);
        wait_until(|| mailbox.mails.lock().unwrap().len() == 1).await;

        let (to, subject, body) = mailbox.mails.lock().unwrap()[0].clone();
        assert_eq!(to, "releng@x");
        assert!(subject.starts_with("Masher Report "));
        assert!(body.starts_with("[ Mash Task #1 ]"));

        let last = orchestrator.last_log().await;
        assert_eq!(last.path, Some(log.display().to_string()));
        assert_eq!(last.contents, "mash output");
    }

    #[tokio::test]
    async fn test_panicking_push_still_completes_and_queue_drains() {
        let mut executor = GatedExecutor::new();
        executor.panic_on = Some(1);
        let executor = Arc::new(executor);
        let mailbox = Arc::new(Mailbox::default());
        let orchestrator = PushOrchestrator::new(executor.clone(), mailbox.clone(), "releng@x");

        orchestrator.mash_tags(repos(&["f8-updates"]));
        orchestrator.mash_tags(repos(&["f8-updates-testing"]));
        executor.release(2);
        wait_until(|| mailbox.mails.lock().unwrap().len() == 2).await;

        let mails = mailbox.mails.lock().unwrap().clone();
        assert!(mails[0].2.contains("*NOT* successful"));
        assert!(mails[0].2.contains("Push #1 aborted"));
        assert!(mails[1].2.contains("The following actions were successful."));
        assert_eq!(executor.started(), vec![1, 2]);
    }
}
