//! In-process stand-ins for the build system, compositor, mirror and
//! notification relay, plus a harness wiring them into [`PushServices`].

use anyhow::Result;
use async_trait::async_trait;
use masher_core::domain::buildsys::{TagMutation, TaskId};
use masher_core::domain::update::{Build, Release, Update, UpdateRequest, UpdateStatus};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::MasherConfig;
use crate::execution::PushServices;
use crate::marker::PushMarker;
use crate::repository::{BuildTagRepository, JsonUpdateRepository, MirrorRepository, UpdateRepository};
use crate::service::{ComposeOutput, NotificationSink, RepoCompositor, UpdateInfoGenerator};

const REPOMD: &str = "<?xml version=\"1.0\"?>\n<repomd>\n  <data type=\"primary\">\n    <location href=\"repodata/primary.xml.gz\"/>\n  </data>\n</repomd>\n";

/// An F8 update with a single build named after its title
pub fn update(title: &str, request: UpdateRequest, status: UpdateStatus) -> Update {
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
        request: Some(request),
        status,
        bugs: vec![1234],
        notes: "Bugfix update".to_string(),
        comments: Vec::new(),
        date_pushed: None,
    }
}

/// Build system holding tags in memory
#[derive(Default)]
pub struct FakeBuildSystem {
    tags: Mutex<HashMap<String, HashSet<String>>>,
    mutations: Mutex<Vec<TagMutation>>,
    listed: Mutex<Vec<String>>,
    fail_tasks: AtomicBool,
}

impl FakeBuildSystem {
    pub fn tag(&self, tag: &str, nvr: &str) {
        self.tags
            .lock()
            .unwrap()
            .entry(tag.to_string())
            .or_default()
            .insert(nvr.to_string());
    }

    pub fn is_tagged(&self, tag: &str, nvr: &str) -> bool {
        self.tags
            .lock()
            .unwrap()
            .get(tag)
            .is_some_and(|builds| builds.contains(nvr))
    }

    /// Every following task ends in failure
    pub fn fail_tasks(&self) {
        self.fail_tasks.store(true, Ordering::SeqCst);
    }

    pub fn mutations(&self) -> Vec<TagMutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildTagRepository for FakeBuildSystem {
    async fn list_tagged(&self, tag: &str) -> Result<HashSet<String>> {
        self.listed.lock().unwrap().push(tag.to_string());
        Ok(self.tags.lock().unwrap().get(tag).cloned().unwrap_or_default())
    }

    async fn batch_mutate(&self, mutations: &[TagMutation]) -> Result<Vec<TaskId>> {
        self.mutations.lock().unwrap().extend_from_slice(mutations);

        if !self.fail_tasks.load(Ordering::SeqCst) {
            let mut tags = self.tags.lock().unwrap();
            for mutation in mutations {
                match mutation {
                    TagMutation::TagBuild { tag, nvr } => {
                        tags.entry(tag.clone()).or_default().insert(nvr.clone());
                    }
                    TagMutation::MoveBuild {
                        from_tag,
                        to_tag,
                        nvr,
                    } => {
                        if let Some(builds) = tags.get_mut(from_tag) {
                            builds.remove(nvr);
                        }
                        tags.entry(to_tag.clone()).or_default().insert(nvr.clone());
                    }
                }
            }
        }

        Ok((1..=mutations.len() as TaskId).collect())
    }

    async fn await_all(&self, _tasks: &[TaskId]) -> Result<bool> {
        Ok(!self.fail_tasks.load(Ordering::SeqCst))
    }
}

/// Compositor that lays out a minimal repository tree per architecture
pub struct FakeCompositor {
    arches: Vec<String>,
    composed: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
    symlink_packages: AtomicBool,
}

impl FakeCompositor {
    pub fn new(arches: Vec<String>) -> Self {
        Self {
            arches,
            composed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            symlink_packages: AtomicBool::new(false),
        }
    }

    /// Every following composition exits non-zero printing `output`
    pub fn fail_with(&self, output: &str) {
        *self.failure.lock().unwrap() = Some(output.to_string());
    }

    /// Packages in following compositions are symlinks
    pub fn symlink_packages(&self) {
        self.symlink_packages.store(true, Ordering::SeqCst);
    }

    pub fn composed(&self) -> Vec<String> {
        self.composed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoCompositor for FakeCompositor {
    async fn refresh_groups(&self) -> Result<()> {
        Ok(())
    }

    async fn compose(
        &self,
        output_dir: &Path,
        _config: &Path,
        _groups: &Path,
        repo: &str,
    ) -> Result<ComposeOutput> {
        self.composed.lock().unwrap().push(repo.to_string());

        if let Some(output) = self.failure.lock().unwrap().clone() {
            return Ok(ComposeOutput {
                exit_code: 1,
                stdout: output,
                stderr: String::new(),
            });
        }

        for arch in &self.arches {
            let archdir = output_dir.join(repo).join(arch);
            let repodata = archdir.join("repodata");
            std::fs::create_dir_all(&repodata)?;
            std::fs::write(repodata.join("repomd.xml"), REPOMD)?;
            std::fs::write(repodata.join("primary.xml.gz"), repo)?;

            let pkg = archdir.join("foo-1.0-1.fc8.noarch.rpm");
            if self.symlink_packages.load(Ordering::SeqCst) {
                std::os::unix::fs::symlink(output_dir.join("koji.rpm"), &pkg)?;
            } else {
                std::fs::write(&pkg, b"rpm")?;
            }
        }

        Ok(ComposeOutput {
            exit_code: 0,
            stdout: format!("mashed {}\n", repo),
            stderr: String::new(),
        })
    }
}

/// Mirror replaying canned responses, then serving a local file
pub struct FakeMirror {
    responses: Mutex<VecDeque<std::result::Result<Vec<u8>, String>>>,
    serve_file: Mutex<Option<PathBuf>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeMirror {
    pub fn new(responses: Vec<std::result::Result<Vec<u8>, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            serve_file: Mutex::new(None),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Serves the current contents of `path` once canned responses run out
    pub fn serve_file(&self, path: PathBuf) {
        *self.serve_file.lock().unwrap() = Some(path);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MirrorRepository for FakeMirror {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response.map_err(|e| anyhow::anyhow!(e));
        }

        let path = self.serve_file.lock().unwrap().clone();
        match path {
            Some(path) => Ok(std::fs::read(path)?),
            None => anyhow::bail!("mirror unreachable"),
        }
    }
}

/// Notification sink remembering everything it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    mails: Mutex<Vec<(String, String, String)>>,
    bug_comments: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// (to, subject, body) of every mail
    pub fn mails(&self) -> Vec<(String, String, String)> {
        self.mails.lock().unwrap().clone()
    }

    /// (update title, comment) of every bug comment
    pub fn bug_comments(&self) -> Vec<(String, String)> {
        self.bug_comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.mails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }

    async fn comment_on_bugs(&self, update: &Update, comment: &str) -> Result<()> {
        if !update.bugs.is_empty() {
            self.bug_comments
                .lock()
                .unwrap()
                .push((update.title.clone(), comment.to_string()));
        }
        Ok(())
    }
}

/// Fakes and a temporary directory tree wired into [`PushServices`]
pub struct Harness {
    pub config: MasherConfig,
    pub tags: Arc<FakeBuildSystem>,
    pub updates: Arc<JsonUpdateRepository>,
    pub compositor: Arc<FakeCompositor>,
    pub mirror: Arc<FakeMirror>,
    pub notifier: Arc<RecordingNotifier>,
    ids: AtomicU64,
    _root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();

        let mut config = MasherConfig::new(root.path().join("mashed"));
        config.mashed_stage_dir = root.path().join("stage");
        config.mash_conf = root.path().join("mash.conf");
        config.comps_dir = root.path().join("comps");
        config.arches = vec!["i386".to_string(), "x86_64".to_string()];
        config.primary_arch = "i386".to_string();
        config.sync_interval = Duration::from_millis(1);
        config.task_poll_interval = Duration::from_millis(1);
        config.updates_db = root.path().join("updates.json");
        std::fs::write(&config.mash_conf, "[f8]\n").unwrap();

        let mirror = FakeMirror::new(Vec::new());
        mirror.serve_file(
            config
                .mashed_dir
                .join("f8-updates")
                .join(&config.primary_arch)
                .join("repodata")
                .join("repomd.xml"),
        );

        Self {
            tags: Arc::new(FakeBuildSystem::default()),
            updates: Arc::new(JsonUpdateRepository::new(config.updates_db.clone())),
            compositor: Arc::new(FakeCompositor::new(config.arches.clone())),
            mirror: Arc::new(mirror),
            notifier: Arc::new(RecordingNotifier::default()),
            ids: AtomicU64::new(0),
            config,
            _root: root,
        }
    }

    pub fn services(&self) -> Arc<PushServices> {
        Arc::new(PushServices {
            config: self.config.clone(),
            tags: self.tags.clone(),
            updates: self.updates.clone(),
            mirror: self.mirror.clone(),
            compositor: self.compositor.clone(),
            metadata: Arc::new(UpdateInfoGenerator::new()),
            notifier: self.notifier.clone(),
            sync_cancel: None,
        })
    }

    pub fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn tag(&self, tag: &str, nvr: &str) {
        self.tags.tag(tag, nvr);
    }

    pub fn is_tagged(&self, tag: &str, nvr: &str) -> bool {
        self.tags.is_tagged(tag, nvr)
    }

    pub async fn store(&self, update: &Update) {
        self.updates.save(update).await.unwrap();
    }

    pub async fn stored(&self, title: &str) -> Update {
        self.updates.find_by_title(title).await.unwrap().unwrap()
    }

    /// Leaves a marker behind as a crashed push would
    pub async fn write_marker(&self, titles: &[&str]) {
        std::fs::create_dir_all(&self.config.mashed_dir).unwrap();
        let titles: Vec<String> = titles.iter().map(|t| t.to_string()).collect();
        PushMarker::new(self.config.marker_path())
            .acquire(&titles, false)
            .await
            .unwrap();
    }
}
