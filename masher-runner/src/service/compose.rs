//! Repository composition
//!
//! Runs the external repository-build tool once per logical repository and
//! captures its exit status and output. Calls block until the tool exits;
//! there is no timeout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Result of one composition run
#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ComposeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Service trait for composing repositories
#[async_trait]
pub trait RepoCompositor: Send + Sync {
    /// Refreshes the shared package-group metadata the compositions consume
    async fn refresh_groups(&self) -> Result<()>;

    /// Composes `repo` into `output_dir`
    ///
    /// # Arguments
    /// * `output_dir` - Fresh directory the tool writes the repository tree into
    /// * `config` - Composition tool configuration file
    /// * `groups` - Package-group metadata file
    /// * `repo` - Logical repository name, e.g. "f8-updates-testing"
    async fn compose(
        &self,
        output_dir: &Path,
        config: &Path,
        groups: &Path,
        repo: &str,
    ) -> Result<ComposeOutput>;
}

/// Composition through the `mash` command line tool
pub struct MashCompositor {
    /// Command template, split on whitespace before placeholders are filled
    command_template: String,
    comps_dir: PathBuf,
    refresh_command: Option<String>,
}

impl MashCompositor {
    pub fn new(
        command_template: impl Into<String>,
        comps_dir: impl Into<PathBuf>,
        refresh_command: Option<String>,
    ) -> Self {
        Self {
            command_template: command_template.into(),
            comps_dir: comps_dir.into(),
            refresh_command,
        }
    }

    /// Expands the template into program and arguments
    ///
    /// Placeholders are substituted per token so paths containing spaces
    /// stay a single argument.
    fn render(&self, output_dir: &Path, config: &Path, groups: &Path, repo: &str) -> Vec<String> {
        self.command_template
            .split_whitespace()
            .map(|token| {
                token
                    .replace("{output}", &output_dir.to_string_lossy())
                    .replace("{config}", &config.to_string_lossy())
                    .replace("{comps}", &groups.to_string_lossy())
                    .replace("{repo}", repo)
            })
            .collect()
    }
}

#[async_trait]
impl RepoCompositor for MashCompositor {
    async fn refresh_groups(&self) -> Result<()> {
        let Some(cmd) = &self.refresh_command else {
            debug!("No group metadata refresh command configured");
            return Ok(());
        };

        if !self.comps_dir.is_dir() {
            warn!(
                "Group metadata directory {} does not exist; skipping refresh",
                self.comps_dir.display()
            );
            return Ok(());
        }

        debug!("Updating comps: `{}` in {}", cmd, self.comps_dir.display());
        let status = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.comps_dir)
            .status()
            .await
            .context("Failed to run group metadata refresh")?;

        if !status.success() {
            warn!("Group metadata refresh exited with {}", status);
        }

        Ok(())
    }

    async fn compose(
        &self,
        output_dir: &Path,
        config: &Path,
        groups: &Path,
        repo: &str,
    ) -> Result<ComposeOutput> {
        let argv = self.render(output_dir, config, groups, repo);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Empty mash command template"))?;

        info!("Running `{}`", argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", program))?;

        let exit_code = output.status.code().unwrap_or(-1);
        info!("mash returncode = {}", exit_code);

        Ok(ComposeOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_substitutes_per_token() {
        let compositor = MashCompositor::new(
            "mash -o {output} -c {config} -f {comps} {repo}",
            "/comps",
            None,
        );
        let argv = compositor.render(
            Path::new("/mashed/dir with space"),
            Path::new("/etc/mash.conf"),
            Path::new("/comps/comps-f8.xml"),
            "f8-updates",
        );

        assert_eq!(
            argv,
            vec![
                "mash",
                "-o",
                "/mashed/dir with space",
                "-c",
                "/etc/mash.conf",
                "-f",
                "/comps/comps-f8.xml",
                "f8-updates",
            ]
        );
    }

    #[tokio::test]
    async fn test_compose_captures_exit_code_and_stdout() {
        let dir = TempDir::new().unwrap();
        let compositor = MashCompositor::new("echo composed {repo}", dir.path(), None);

        let output = compositor
            .compose(dir.path(), Path::new("c"), Path::new("g"), "f8-updates")
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "composed f8-updates");

        let compositor = MashCompositor::new("false {output} {repo}", dir.path(), None);
        let output = compositor
            .compose(dir.path(), Path::new("c"), Path::new("g"), "f8-updates")
            .await
            .unwrap();
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_refresh_groups_runs_in_comps_dir() {
        let dir = TempDir::new().unwrap();
        let compositor = MashCompositor::new(
            "mash {output} {repo}",
            dir.path(),
            Some("touch refreshed".to_string()),
        );

        compositor.refresh_groups().await.unwrap();
        assert!(dir.path().join("refreshed").exists());
    }

    #[tokio::test]
    async fn test_refresh_groups_without_command_is_noop() {
        let compositor = MashCompositor::new("mash {output} {repo}", "/nonexistent", None);
        assert!(compositor.refresh_groups().await.is_ok());
    }
}
