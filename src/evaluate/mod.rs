#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-repository evaluators and their fan-out over a set of repositories.
//!
//! Most evaluators only decide what one file is worth; [`walk_repository`]
//! supplies the shared traversal that turns those per-file cells into one
//! table row. The single-log commit counter replaces the traversal with one
//! whole-repository query.

pub mod comments;
pub mod commits;
pub mod scripts;

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{
    cell::Cell,
    classify::{is_ignored_filename, is_ignored_path},
    pool,
    repo::RepoDescriptor,
    table::SparseTable,
};
pub use comments::{CommentCounter, Scoring};
pub use commits::{CommitCountByFile, CommitLogCounter, LogParseError, parse_commit_log};
pub use scripts::{ScriptRunConfig, ScriptRunner};

/// Column key for a repository-relative path: lower-cased and
/// forward-slash separated.
pub fn column_key(relative: &Path) -> String {
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase()
}

/// One file handed to a [`FileEvaluator`].
#[derive(Debug, Clone)]
pub struct FileContext<'a> {
    /// Repository the file belongs to.
    pub repo:      &'a RepoDescriptor,
    /// Directory containing the file; subprocesses run here.
    pub dir:       PathBuf,
    /// Absolute path of the file.
    pub path:      PathBuf,
    /// File name without directories.
    pub file_name: String,
    /// Column the result is stored under.
    pub column:    String,
}

/// Strategy for scoring one file.
pub trait FileEvaluator: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Produces the cell for one non-ignored file.
    fn evaluate_file(&self, file: &FileContext<'_>) -> impl Future<Output = Result<Cell>> + Send;

    /// Value of the repository's total column, computed after every file
    /// has been scored. `None` means no total column.
    fn repository_total(&self, _table: &SparseTable, _row: &str) -> Option<Cell> {
        None
    }
}

/// Every regular, non-ignored file under `root`, depth-first in name order.
///
/// Ignored directories are not descended into.
pub fn candidate_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !is_ignored_path(Path::new(entry.file_name()))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("Could not walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_ignored_filename(&name) {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Scores every candidate file of `repo` with `evaluator`.
///
/// Files are processed one at a time.
pub async fn walk_repository<E: FileEvaluator>(
    evaluator: &E,
    repo: &RepoDescriptor,
) -> Result<SparseTable> {
    let mut table = SparseTable::new();
    for path in candidate_files(&repo.path)? {
        let relative = path
            .strip_prefix(&repo.path)
            .with_context(|| format!("{} is outside {}", path.display(), repo.path.display()))?;
        let file = FileContext {
            repo,
            dir: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| repo.path.clone()),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            column: column_key(relative),
            path: path.clone(),
        };
        let cell = evaluator
            .evaluate_file(&file)
            .await
            .with_context(|| format!("{} failed on {}", evaluator.name(), path.display()))?;
        debug!("{}[{}][{}] = {cell}", evaluator.name(), repo.name, file.column);
        table.set(repo.name.as_str(), file.column, cell)?;
    }

    if let Some(total) = evaluator.repository_total(&table, &repo.name) {
        table.set(repo.name.as_str(), crate::constants::TOTAL_COLUMN, total)?;
    }
    Ok(table)
}

/// The closed set of evaluators a section can run.
#[derive(Debug)]
pub enum Evaluator {
    /// One log query per file.
    CommitCountByFile(CommitCountByFile),
    /// One log query per repository with fractional credit.
    CommitLog(CommitLogCounter),
    /// Comment counting or sizing.
    Comments(CommentCounter),
    /// Syntax check and guarded execution of every script.
    RunEach(ScriptRunner),
}

impl Evaluator {
    /// Short name used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Evaluator::CommitCountByFile(e) => e.name(),
            Evaluator::CommitLog(_) => CommitLogCounter::NAME,
            Evaluator::Comments(e) => e.name(),
            Evaluator::RunEach(e) => e.name(),
        }
    }

    /// Evaluates one repository into a table holding its row.
    pub async fn evaluate_repository(&self, repo: &RepoDescriptor) -> Result<SparseTable> {
        let start = Instant::now();
        info!("{} start: {}", self.name(), repo.name);
        let table = match self {
            Evaluator::CommitCountByFile(e) => walk_repository(e, repo).await,
            Evaluator::CommitLog(e) => e.evaluate_repository(repo).await,
            Evaluator::Comments(e) => walk_repository(e, repo).await,
            Evaluator::RunEach(e) => walk_repository(e, repo).await,
        }
        .with_context(|| format!("{} failed in {}", self.name(), repo.path.display()))?;
        info!(
            "{} end: {} ({:.3} sec)",
            self.name(),
            repo.name,
            start.elapsed().as_secs_f64()
        );
        Ok(table)
    }
}

/// Runs `evaluator` over every repository and merges the rows.
///
/// With `parallel`, repositories are spread over a pool of one worker per
/// processor and merged as they complete.
pub async fn evaluate_all(
    evaluator: Arc<Evaluator>,
    repos: Vec<RepoDescriptor>,
    parallel: bool,
) -> Result<SparseTable> {
    let start = Instant::now();
    let name = evaluator.name();
    let count = repos.len();
    let mut merged = SparseTable::new();
    pool::fan_out(
        repos,
        parallel,
        move |repo| {
            let evaluator = Arc::clone(&evaluator);
            async move { evaluator.evaluate_repository(&repo).await }
        },
        |partial| merged.merge(partial).map_err(Into::into),
    )
    .await?;
    info!(
        "{name}: {count} repositories in {:.3} sec",
        start.elapsed().as_secs_f64()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_keys_are_lowercase_and_slash_joined() {
        assert_eq!(column_key(Path::new("Week1/Ex01.PY")), "week1/ex01.py");
        assert_eq!(column_key(Path::new("a.py")), "a.py");
    }

    #[test]
    fn candidate_files_skip_ignored_directories_and_readmes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join(".git/objects")).expect("git dir");
        std::fs::create_dir_all(root.join("week1/__pycache__")).expect("cache dir");
        std::fs::write(root.join(".git/config"), "[core]").expect("write");
        std::fs::write(root.join(".git/objects/ab"), "x").expect("write");
        std::fs::write(root.join("week1/__pycache__/a.pyc"), "x").expect("write");
        std::fs::write(root.join("week1/a.py"), "print(1)").expect("write");
        std::fs::write(root.join("README.md"), "# hi").expect("write");

        let files = candidate_files(root).expect("walk");
        assert_eq!(files, vec![root.join("week1/a.py")]);
    }
}
