use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use containers::Tip;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { pushed: bool },
    /// The working tree already matched the last commit.
    NothingToCommit,
    /// Committing is switched off.
    Disabled,
}

/// Snapshots the archive once a cycle has reached a tip.
///
/// Failures are reported but never fatal to the sync cycle.
#[async_trait]
pub trait Committer: Send + Sync {
    async fn commit(&self, tip: &Tip) -> Result<CommitOutcome>;
}

#[async_trait]
impl<T: Committer + ?Sized> Committer for Box<T> {
    async fn commit(&self, tip: &Tip) -> Result<CommitOutcome> {
        (**self).commit(tip).await
    }
}

#[async_trait]
impl<T: Committer + ?Sized> Committer for Arc<T> {
    async fn commit(&self, tip: &Tip) -> Result<CommitOutcome> {
        (**self).commit(tip).await
    }
}

/// Committer for archives that are not version-controlled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCommitter;

#[async_trait]
impl Committer for NoopCommitter {
    async fn commit(&self, _tip: &Tip) -> Result<CommitOutcome> {
        Ok(CommitOutcome::Disabled)
    }
}

/// Result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one git command in the archive repository.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<GitOutput>;
}

/// [`GitRunner`] spawning the `git` executable.
#[derive(Debug, Clone)]
pub struct ProcessGitRunner {
    repo_dir: PathBuf,
}

impl ProcessGitRunner {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

#[async_trait]
impl GitRunner for ProcessGitRunner {
    async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn git {}", args.join(" ")))?;

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub remote: String,
    pub branch: Option<String>,
}

/// Commits the archive with git and optionally pushes it.
#[derive(Debug)]
pub struct GitCommitter<R: GitRunner = ProcessGitRunner> {
    runner: R,
    push: Option<PushTarget>,
}

impl GitCommitter<ProcessGitRunner> {
    pub fn new(repo_dir: impl Into<PathBuf>, push: Option<PushTarget>) -> Self {
        Self::with_runner(ProcessGitRunner::new(repo_dir), push)
    }
}

impl<R: GitRunner> GitCommitter<R> {
    pub fn with_runner(runner: R, push: Option<PushTarget>) -> Self {
        Self { runner, push }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn commit_message(tip: &Tip) -> String {
        format!("Archive block {} {}", tip.height, tip.hash)
    }

    /// Makes sure the repository exists, and with `lfs_extension` set,
    /// tracks `*.<ext>` block files with git LFS.
    pub async fn prepare(&self, lfs_extension: Option<&str>) -> Result<()> {
        let inside = self.runner.run(&["rev-parse", "--is-inside-work-tree"]).await?;
        if !inside.success() {
            info!("Initializing git repository for archive");
            self.run_checked(&["init", "-q"]).await?;
        }

        if let Some(extension) = lfs_extension {
            let pattern = format!("*.{extension}");
            self.run_checked(&["lfs", "install", "--local"]).await?;
            self.run_checked(&["lfs", "track", &pattern]).await?;
            info!(%pattern, "Tracking block files with git lfs");
        }

        Ok(())
    }

    async fn run_checked(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.runner.run(args).await?;
        if !output.success() {
            bail!(
                "git {} exited with {:?}: {}",
                args.join(" "),
                output.code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }
}

#[async_trait]
impl<R: GitRunner> Committer for GitCommitter<R> {
    async fn commit(&self, tip: &Tip) -> Result<CommitOutcome> {
        self.run_checked(&["add", "-A", "."]).await?;

        // `diff --cached --quiet` exits 0 when nothing is staged, 1 otherwise.
        let staged = self.runner.run(&["diff", "--cached", "--quiet"]).await?;
        match staged.code {
            Some(0) => {
                debug!(tip = %tip, "Archive unchanged, skipping commit");
                return Ok(CommitOutcome::NothingToCommit);
            }
            Some(1) => {}
            code => bail!("git diff --cached exited with {code:?}: {}", staged.stderr.trim()),
        }

        let message = Self::commit_message(tip);
        self.run_checked(&["commit", "-q", "-m", &message]).await?;
        info!(tip = %tip, "Committed archive");

        let Some(target) = &self.push else {
            return Ok(CommitOutcome::Committed { pushed: false });
        };

        let mut args = vec!["push", "-q", target.remote.as_str()];
        if let Some(branch) = &target.branch {
            args.push(branch.as_str());
        }
        self.run_checked(&args)
            .await
            .context("archive committed locally but push failed")?;
        info!(remote = %target.remote, "Pushed archive");

        Ok(CommitOutcome::Committed { pushed: true })
    }
}
