//! Masher configuration
//!
//! Defines every path, command template, endpoint and interval a push needs.
//! Values come from environment variables with fallback to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback composition tool configuration when `mash_conf` does not exist
const SYSTEM_MASH_CONF: &str = "/etc/bodhi/mash.conf";

/// Masher configuration
#[derive(Debug, Clone)]
pub struct MasherConfig {
    /// Root directory that composed repositories, live symlinks, the
    /// repodata cache and the resumption marker live in
    pub mashed_dir: PathBuf,

    /// Directory validated trees are relocated into before going live
    pub mashed_stage_dir: PathBuf,

    /// Composition tool configuration file
    pub mash_conf: PathBuf,

    /// Composition command template.
    /// Placeholders: `{output}`, `{config}`, `{comps}`, `{repo}`
    pub mash_command: String,

    /// Checkout holding the package-group metadata (`comps-<prefix>.xml`)
    pub comps_dir: PathBuf,

    /// Shell command run inside `comps_dir` to refresh group metadata
    pub comps_refresh_command: Option<String>,

    /// Architectures every composed repository must contain
    pub arches: Vec<String>,

    /// Architecture whose repomd.xml is compared against the mirror
    pub primary_arch: String,

    /// Mirror repomd.xml URL template. Placeholder: `{version}`
    pub master_repomd: String,

    /// Fixed delay between mirror polls
    pub sync_interval: Duration,

    /// Build system API base URL
    pub buildsys_url: String,

    /// Fixed delay between build system task polls
    pub task_poll_interval: Duration,

    /// JSON file backing the update store
    pub updates_db: PathBuf,

    /// Webhook receiving reports and mail; unset means log only
    pub notify_url: Option<String>,

    /// Sender address for outgoing mail
    pub from_email: String,

    /// Recipient of the per-push operations report
    pub releng_list: String,

    /// Recipient of the per-release testing digest
    pub test_announce_list: String,

    /// Recipient of notices for updates that reach stable
    pub announce_list: String,
}

impl MasherConfig {
    /// Creates a configuration rooted at `mashed_dir` with defaults for everything else
    pub fn new(mashed_dir: PathBuf) -> Self {
        Self {
            mashed_stage_dir: mashed_dir.clone(),
            mashed_dir,
            mash_conf: PathBuf::from("/etc/masher/mash.conf"),
            mash_command: "mash -o {output} -c {config} -f {comps} {repo}".to_string(),
            comps_dir: PathBuf::from("/var/cache/masher/comps"),
            comps_refresh_command: None,
            arches: vec!["i386".to_string(), "x86_64".to_string(), "ppc".to_string()],
            primary_arch: "i386".to_string(),
            master_repomd:
                "http://download.example.org/pub/updates/{version}/i386/repodata/repomd.xml"
                    .to_string(),
            sync_interval: Duration::from_secs(600),
            buildsys_url: "http://localhost:8081".to_string(),
            task_poll_interval: Duration::from_secs(5),
            updates_db: PathBuf::from("/var/lib/masher/updates.json"),
            notify_url: None,
            from_email: "updates@example.org".to_string(),
            releng_list: "release-engineering@example.org".to_string(),
            test_announce_list: "test-announce@example.org".to_string(),
            announce_list: "package-announce@example.org".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - MASHED_DIR (required)
    /// - MASHED_STAGE_DIR (optional, default: MASHED_DIR)
    /// - MASH_CONF, MASH_COMMAND, COMPS_DIR, COMPS_REFRESH_COMMAND (optional)
    /// - ARCHES (optional, whitespace separated), PRIMARY_ARCH (optional)
    /// - MASTER_REPOMD, BUILDSYS_URL, NOTIFY_URL (optional)
    /// - SYNC_INTERVAL, TASK_POLL_INTERVAL (optional, seconds)
    /// - UPDATES_DB, MASHER_EMAIL, RELENG_LIST, TEST_ANNOUNCE_LIST, ANNOUNCE_LIST (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let mashed_dir = std::env::var("MASHED_DIR")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("MASHED_DIR environment variable not set"))?;

        let mut config = Self::new(mashed_dir);

        if let Ok(dir) = std::env::var("MASHED_STAGE_DIR") {
            config.mashed_stage_dir = PathBuf::from(dir);
        }
        if let Ok(conf) = std::env::var("MASH_CONF") {
            config.mash_conf = PathBuf::from(conf);
        }
        if let Ok(cmd) = std::env::var("MASH_COMMAND") {
            config.mash_command = cmd;
        }
        if let Ok(dir) = std::env::var("COMPS_DIR") {
            config.comps_dir = PathBuf::from(dir);
        }
        config.comps_refresh_command = std::env::var("COMPS_REFRESH_COMMAND").ok();

        if let Ok(arches) = std::env::var("ARCHES") {
            config.arches = arches.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(arch) = std::env::var("PRIMARY_ARCH") {
            config.primary_arch = arch;
        }
        if let Ok(url) = std::env::var("MASTER_REPOMD") {
            config.master_repomd = url;
        }
        if let Some(secs) = env_secs("SYNC_INTERVAL") {
            config.sync_interval = secs;
        }
        if let Ok(url) = std::env::var("BUILDSYS_URL") {
            config.buildsys_url = url;
        }
        if let Some(secs) = env_secs("TASK_POLL_INTERVAL") {
            config.task_poll_interval = secs;
        }
        if let Ok(path) = std::env::var("UPDATES_DB") {
            config.updates_db = PathBuf::from(path);
        }
        config.notify_url = std::env::var("NOTIFY_URL").ok();
        if let Ok(email) = std::env::var("MASHER_EMAIL") {
            config.from_email = email;
        }
        if let Ok(list) = std::env::var("RELENG_LIST") {
            config.releng_list = list;
        }
        if let Ok(list) = std::env::var("TEST_ANNOUNCE_LIST") {
            config.test_announce_list = list;
        }
        if let Ok(list) = std::env::var("ANNOUNCE_LIST") {
            config.announce_list = list;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mashed_dir.as_os_str().is_empty() {
            anyhow::bail!("mashed_dir cannot be empty");
        }

        if self.mashed_stage_dir.as_os_str().is_empty() {
            anyhow::bail!("mashed_stage_dir cannot be empty");
        }

        if self.arches.is_empty() {
            anyhow::bail!("at least one arch must be configured");
        }

        if !self.arches.contains(&self.primary_arch) {
            anyhow::bail!(
                "primary_arch '{}' is not one of the configured arches",
                self.primary_arch
            );
        }

        if !self.mash_command.contains("{output}") || !self.mash_command.contains("{repo}") {
            anyhow::bail!("mash_command must contain {{output}} and {{repo}} placeholders");
        }

        for (name, url) in [
            ("master_repomd", &self.master_repomd),
            ("buildsys_url", &self.buildsys_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.sync_interval.is_zero() {
            anyhow::bail!("sync_interval must be greater than 0");
        }

        if self.task_poll_interval.is_zero() {
            anyhow::bail!("task_poll_interval must be greater than 0");
        }

        Ok(())
    }

    /// Path of the resumption marker
    pub fn marker_path(&self) -> PathBuf {
        self.mashed_dir.join("MASHING")
    }

    /// Composition configuration actually handed to the tool
    ///
    /// Falls back to the system-wide file when the configured one is missing.
    pub fn effective_mash_conf(&self) -> Option<PathBuf> {
        if self.mash_conf.exists() {
            Some(self.mash_conf.clone())
        } else if Path::new(SYSTEM_MASH_CONF).exists() {
            Some(PathBuf::from(SYSTEM_MASH_CONF))
        } else {
            None
        }
    }

    /// Group metadata file for a repository, keyed by the name's first segment
    pub fn comps_path(&self, repo: &str) -> PathBuf {
        let prefix = repo.split('-').next().unwrap_or(repo);
        self.comps_dir.join(format!("comps-{}.xml", prefix))
    }

    /// Live symlink for a repository
    pub fn live_link(&self, repo: &str) -> PathBuf {
        self.mashed_dir.join(repo)
    }

    /// Cached repodata directory for a repository
    pub fn repodata_cache(&self, repo: &str) -> PathBuf {
        self.mashed_dir.join(format!("{}.repodata", repo))
    }

    /// Mirror URL for a release version
    pub fn master_repomd_url(&self, version: &str) -> String {
        self.master_repomd.replace("{version}", version)
    }
}

impl Default for MasherConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("/var/cache/masher/mashed"))
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
