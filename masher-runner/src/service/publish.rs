//! Publishing composed repositories
//!
//! A composed tree only goes live after it passes validation. While being
//! validated its architecture directories carry a `.newkey` suffix, so a tree
//! left behind by a failed check is recognisable on disk.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::MasherConfig;
use crate::error::{PushError, Result};

const TRANSITIONAL_SUFFIX: &str = ".newkey";

/// Validates, relocates and links composed repositories
pub struct RepoPublisher {
    config: MasherConfig,
}

impl RepoPublisher {
    pub fn new(config: MasherConfig) -> Self {
        Self { config }
    }

    /// Publishes the tree composed for `repo` in `mashdir`
    ///
    /// Returns the location of `mashdir` after relocation into the staging
    /// root. The live symlink is only touched once every check has passed.
    pub async fn publish(&self, repo: &str, mashdir: &Path) -> Result<PathBuf> {
        let newrepo = mashdir.join(repo);

        debug!("Moving each arch to arch{}", TRANSITIONAL_SUFFIX);
        for arch in list_dirs(&newrepo).await? {
            if arch.ends_with(TRANSITIONAL_SUFFIX) {
                continue;
            }
            tokio::fs::rename(
                newrepo.join(&arch),
                newrepo.join(format!("{}{}", arch, TRANSITIONAL_SUFFIX)),
            )
            .await?;
        }

        debug!("Running sanity checks on {}", newrepo.display());
        for arch in &self.config.arches {
            let staged = newrepo.join(format!("{}{}", arch, TRANSITIONAL_SUFFIX));
            if !staged.is_dir() {
                return Err(PushError::PublishValidation(format!(
                    "Cannot find arch {} in {}",
                    arch,
                    newrepo.display()
                )));
            }

            sanity_check_repodata(&staged.join("repodata"))
                .await
                .map_err(|e| {
                    PushError::PublishValidation(format!("Repodata sanity check failed!\n{}", e))
                })?;

            if let Some(pkg) = find_symlinked_package(&staged).await? {
                return Err(PushError::PublishValidation(format!(
                    "Mashed repository full of symlinks! ({})",
                    pkg.display()
                )));
            }
        }

        for staged in list_dirs(&newrepo).await? {
            if let Some(arch) = staged.strip_suffix(TRANSITIONAL_SUFFIX) {
                tokio::fs::rename(newrepo.join(&staged), newrepo.join(arch)).await?;
            }
        }

        let published = self.relocate(mashdir).await?;
        self.update_live_link(repo, &published.join(repo)).await?;

        Ok(published)
    }

    /// Moves a validated tree into the staging root
    async fn relocate(&self, mashdir: &Path) -> Result<PathBuf> {
        if self.config.mashed_dir == self.config.mashed_stage_dir {
            debug!("mashed_dir and mashed_stage_dir are the same.");
            return Ok(mashdir.to_path_buf());
        }

        let name = mashdir
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid mash directory {}", mashdir.display()))?;
        let dest = self.config.mashed_stage_dir.join(name);

        debug!("Moving {} => {}", mashdir.display(), dest.display());
        move_tree(mashdir, &dest).await.with_context(|| {
            format!("Failed to move {} to {}", mashdir.display(), dest.display())
        })?;

        Ok(dest)
    }

    /// Repoints `<mashed_dir>/<repo>` at `target`
    async fn update_live_link(&self, repo: &str, target: &Path) -> Result<()> {
        let link = self.config.live_link(repo);

        if let Ok(meta) = tokio::fs::symlink_metadata(&link).await {
            if !meta.file_type().is_symlink() {
                return Err(PushError::PublishValidation(format!(
                    "{} exists and is not a symlink",
                    link.display()
                )));
            }
            tokio::fs::remove_file(&link).await?;
        }

        tokio::fs::symlink(target, &link).await?;
        info!("Created symlink: {} => {}", target.display(), link.display());
        Ok(())
    }

    /// Replaces the repodata cache of `repo` with the tree published in `mashdir`
    pub async fn cache_repodata(&self, repo: &str, mashdir: &Path) -> Result<()> {
        let rdcache = self.config.repodata_cache(repo);
        if rdcache.is_dir() {
            debug!("Removing old repodata cache {}", rdcache.display());
            tokio::fs::remove_dir_all(&rdcache).await?;
        }
        tokio::fs::create_dir_all(&rdcache).await?;

        let tree = mashdir.join(repo);
        for arch in list_dirs(&tree).await? {
            let src = tree.join(&arch).join("repodata");
            copy_tree(&src, &rdcache.join(&arch)).await?;
        }

        debug!("Cached repodata for {} in {}", repo, rdcache.display());
        Ok(())
    }
}

/// Structural check of one architecture's metadata directory
///
/// `repomd.xml` must exist, be a repomd document, and every file it
/// references must be present.
pub async fn sanity_check_repodata(repodata: &Path) -> std::result::Result<(), String> {
    if !repodata.is_dir() {
        return Err(format!("{} is not a directory", repodata.display()));
    }

    let repomd_path = repodata.join("repomd.xml");
    let repomd = tokio::fs::read_to_string(&repomd_path)
        .await
        .map_err(|e| format!("Cannot read {}: {}", repomd_path.display(), e))?;

    if !repomd.contains("<repomd") {
        return Err(format!("{} is not a repomd document", repomd_path.display()));
    }

    let root = repodata.parent().unwrap_or(repodata);
    for href in location_hrefs(&repomd) {
        if !root.join(&href).is_file() {
            return Err(format!("{} references missing file {}", repomd_path.display(), href));
        }
    }

    Ok(())
}

/// Extracts every `<location href="...">` value from a repomd document
fn location_hrefs(repomd: &str) -> Vec<String> {
    const NEEDLE: &str = "<location href=\"";

    let mut hrefs = Vec::new();
    let mut rest = repomd;
    while let Some(start) = rest.find(NEEDLE) {
        rest = &rest[start + NEEDLE.len()..];
        match rest.find('"') {
            Some(end) => {
                hrefs.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            None => break,
        }
    }
    hrefs
}

async fn find_symlinked_package(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "rpm")
            && entry.file_type().await?.is_symlink()
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Names of the subdirectories of `dir`, sorted
async fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Renames `src` to `dst`, copying then removing when they sit on
/// different filesystems
async fn move_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(src, dst).await {
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("{} is on another filesystem, copying", dst.display());
            copy_tree(src, dst).await?;
            tokio::fs::remove_dir_all(src).await
        }
        other => other,
    }
}

async fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || copy_dir(&src, &dst))
        .await
        .map_err(std::io::Error::other)?
}

/// Recursive copy; symlinks are recreated rather than followed
fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            std::os::unix::fs::symlink(std::fs::read_link(entry.path())?, &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
