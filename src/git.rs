#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Thin wrapper over the `git` binary.
//!
//! Every call names the repository directory explicitly.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    constants::{COMMIT_SPLIT_TOKEN, FIELD_SPLIT_TOKEN, NOT_APPLICABLE},
    process::{CommandSpec, os_args},
    repo::RepoDescriptor,
};

/// Decoded output of one `git` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl GitOutput {
    /// Whether the output carries one of git's failure markers: a merge
    /// `CONFLICT` on stdout, or `fatal`/`error` on stderr.
    pub fn signals_failure(&self) -> bool {
        self.stdout.starts_with("CONFLICT")
            || self.stderr.contains("fatal")
            || self.stderr.contains("error")
    }
}

/// Located `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    /// Path to the binary.
    program: PathBuf,
}

impl Git {
    /// Finds `git` on `PATH`.
    pub fn locate() -> Result<Self> {
        let program = which::which("git").context("Cannot find git on PATH")?;
        Ok(Self { program })
    }

    /// Uses the given binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs `git <args>` inside `dir`.
    pub async fn run(&self, dir: &Path, args: Vec<OsString>) -> Result<GitOutput> {
        let spec = CommandSpec::builder()
            .program(self.program.clone())
            .args(args)
            .cwd(dir)
            .build();
        let collected = spec
            .collect()
            .await
            .with_context(|| format!("`{}` failed in {}", spec.display(), dir.display()))?;
        Ok(GitOutput {
            stdout: collected.stdout_text(),
            stderr: collected.stderr_text(),
        })
    }

    /// Like [`Self::run`], but a failure marker in the output is an error.
    pub async fn run_required(&self, dir: &Path, args: Vec<OsString>) -> Result<GitOutput> {
        let shown = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let output = self.run(dir, args).await?;
        if output.signals_failure() {
            anyhow::bail!(
                "git {shown} in {} reported an error:\n{}",
                dir.display(),
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    /// `git log --follow` for one file, in git's default layout.
    pub async fn file_log(&self, dir: &Path, file: &Path) -> Result<String> {
        let mut args = os_args(["log", "--follow", "--"]);
        args.push(file.as_os_str().to_os_string());
        Ok(self.run_required(dir, args).await?.stdout)
    }

    /// Whole-repository log with per-commit markers and `--numstat` listings.
    ///
    /// Each record starts with [`COMMIT_SPLIT_TOKEN`] followed by hash, author
    /// name, author email, date, and subject separated by
    /// [`FIELD_SPLIT_TOKEN`].
    pub async fn numstat_log(
        &self,
        dir: &Path,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<String> {
        let f = FIELD_SPLIT_TOKEN;
        let mut args = vec![
            "log".to_string(),
            "--encoding=utf-8".to_string(),
            "--numstat".to_string(),
            "--all".to_string(),
            format!("--pretty=format:{COMMIT_SPLIT_TOKEN}%H{f}%an{f}%ae{f}%ad{f}%s"),
        ];
        if let Some(after) = after.filter(|s| !s.is_empty()) {
            args.push(format!("--after={after}"));
        }
        if let Some(before) = before.filter(|s| !s.is_empty()) {
            args.push(format!("--before={before}"));
        }
        Ok(self.run_required(dir, os_args(args)).await?.stdout)
    }

    /// Short hash of the latest commit touching `file`, or `N/A`.
    pub async fn last_sha(&self, dir: &Path, file: &Path) -> String {
        let mut args = os_args(["log", "--pretty=format:%h", "-1", "--"]);
        args.push(file.as_os_str().to_os_string());
        match self.run(dir, args).await {
            Ok(output) if !output.signals_failure() && !output.stdout.trim().is_empty() => {
                output.stdout.trim().to_string()
            }
            _ => NOT_APPLICABLE.to_string(),
        }
    }

    /// Checks out `commit` in `dir`.
    pub async fn checkout(&self, dir: &Path, commit: &str) -> Result<()> {
        self.run_required(dir, os_args(["checkout", commit]))
            .await
            .map(|_| ())
    }

    /// Discards local changes and untracked files.
    async fn clean_and_reset(&self, dir: &Path) -> Result<()> {
        self.run(dir, os_args(["clean", "-xdf"])).await?;
        self.run(dir, os_args(["reset", "--hard", "HEAD"])).await?;
        Ok(())
    }

    /// Runs one update step, cleaning up after it if it reports failure.
    async fn update_step(&self, dir: &Path, args: &[&str]) -> Result<()> {
        let output = self.run(dir, os_args(args.iter().copied())).await?;
        if output.signals_failure() {
            warn!(
                "git {} in {} reported a problem; cleaning up\n{}",
                args.join(" "),
                dir.display(),
                output.stderr.trim()
            );
            self.clean_and_reset(dir).await?;
        }
        Ok(())
    }

    /// Brings an existing clone in line with its origin.
    pub async fn fetch_and_reset(&self, dir: &Path) -> Result<()> {
        self.update_step(dir, &["reset", "--hard", "HEAD"]).await?;
        self.update_step(dir, &["clean", "-xdf"]).await?;
        self.update_step(dir, &["fetch", "origin"]).await?;
        self.update_step(dir, &["reset", "--hard", "origin/HEAD"])
            .await
    }

    /// Clones `url` into `folder`, or updates the existing clone when
    /// `update` is set.
    ///
    /// `clone_url` is what git is given; it may carry a user component that
    /// `url` does not.
    pub async fn clone_or_update(
        &self,
        url: &str,
        clone_url: &str,
        folder: &Path,
        update: bool,
    ) -> Result<RepoDescriptor> {
        let repo = RepoDescriptor::from_url(url, folder)?;
        if repo.path.exists() {
            if update {
                info!("Updating {}", repo.name);
                self.fetch_and_reset(&repo.path).await?;
            }
        } else {
            tokio::fs::create_dir_all(folder)
                .await
                .with_context(|| format!("Could not create {}", folder.display()))?;
            info!("Cloning {}", repo.name);
            let mut args = os_args(["clone", clone_url]);
            args.push(repo.path.as_os_str().to_os_string());
            let output = self.run(folder, args).await?;
            if !repo.path.exists() {
                anyhow::bail!("Could not clone {url}:\n{}", output.stderr.trim());
            }
        }
        Ok(repo)
    }
}
