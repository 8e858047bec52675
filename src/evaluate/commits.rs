#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Commit counting evaluators.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use num_rational::Rational64;
use regex::Regex;
use thiserror::Error;

use super::{FileContext, FileEvaluator};
use crate::{
    cell::Cell,
    classify::{is_ignored_filename, is_ignored_path},
    constants::{COMMIT_SPLIT_TOKEN, FIELD_SPLIT_TOKEN, TOTAL_COLUMN},
    git::Git,
    repo::RepoDescriptor,
    table::SparseTable,
};

/// A commit header that still does not split into five fields after
/// de-quoting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed commit header after {attempts} attempts: {line:?}")]
pub struct LogParseError {
    /// The raw header line.
    pub line:     String,
    /// Number of parse attempts made.
    pub attempts: usize,
}

/// Counts `git log --follow` records for each file.
#[derive(Debug, Clone)]
pub struct CommitCountByFile {
    /// Git runner.
    git:    Git,
    /// Matches one log record: commit, author, and date lines.
    record: Regex,
}

impl CommitCountByFile {
    /// Builds the evaluator around a located git binary.
    pub fn new(git: Git) -> Result<Self> {
        Ok(Self {
            git,
            record: Regex::new(
                r"(?mi)^commit\s+(?P<sha>.+)\nAuthor:\s+(?P<author>.+)\nDate:\s+(?P<date>.+)\n",
            )
            .context("Could not compile log record pattern")?,
        })
    }

    /// Number of log records in `log`.
    pub fn count_records(&self, log: &str) -> usize {
        self.record.find_iter(log).count()
    }
}

impl FileEvaluator for CommitCountByFile {
    fn name(&self) -> &'static str {
        "CommitCountByFile"
    }

    async fn evaluate_file(&self, file: &FileContext<'_>) -> Result<Cell> {
        let log = self
            .git
            .file_log(&file.dir, Path::new(&file.file_name))
            .await?;
        Ok(Cell::count(self.count_records(&log) as i64))
    }
}

/// Header fields of one commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
    /// Full hash.
    pub sha:     String,
    /// Author name.
    pub author:  String,
    /// Author email.
    pub email:   String,
    /// Author date.
    pub date:    String,
    /// Subject line.
    pub subject: String,
}

impl CommitHeader {
    /// Splits a header line into its five fields.
    fn split(line: &str) -> Option<Self> {
        let (sha, author, email, date, subject) =
            line.split(FIELD_SPLIT_TOKEN).collect_tuple()?;
        Some(Self {
            sha:     sha.to_string(),
            author:  author.to_string(),
            email:   email.to_string(),
            date:    date.to_string(),
            subject: subject.to_string(),
        })
    }

    /// Parses a header, retrying after removing surrounding quotes.
    pub fn parse(line: &str) -> Result<Self, LogParseError> {
        let unwrapped = line
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(line);
        let attempts = [
            unwrapped,
            line.trim_matches('"'),
            line.trim_matches(|c: char| c == '"' || c == '\''),
        ];
        attempts
            .iter()
            .find_map(|candidate| Self::split(candidate))
            .ok_or_else(|| LogParseError {
                line:     line.to_string(),
                attempts: attempts.len(),
            })
    }
}

/// Path of a `--numstat` line (`<added>\t<deleted>\t<path>`) as git
/// printed it.
fn numstat_path(line: &str) -> Option<&str> {
    let path = line.splitn(3, '\t').nth(2)?.trim();
    (!path.is_empty()).then_some(path)
}

/// Whether a touched path is excluded from credit.
///
/// Runs on the path as git printed it; file-name filters are case-sensitive.
fn is_ignored_column(raw: &str) -> bool {
    let path = Path::new(raw);
    let ignored_dir = path.parent().is_some_and(is_ignored_path);
    let ignored_name = path
        .file_name()
        .is_some_and(|name| is_ignored_filename(&name.to_string_lossy()));
    ignored_dir || ignored_name
}

/// Turns a whole-repository `--numstat` log into one table row.
///
/// `" total"` holds the number of commits whose author email is not in
/// `exclude_emails`. Each non-ignored file touched by such a commit receives
/// `1/n` credit, `n` being the number of non-ignored files in that commit.
pub fn parse_commit_log(
    log: &str,
    row: &str,
    exclude_emails: &[String],
) -> Result<SparseTable> {
    let mut credit: HashMap<String, Rational64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut commits = 0i64;

    let mut blocks = log.split(COMMIT_SPLIT_TOKEN).peekable();
    if blocks
        .peek()
        .is_some_and(|first| first.trim_matches(|c: char| c == '"' || c.is_whitespace()).is_empty())
    {
        blocks.next();
    }

    for block in blocks {
        let mut lines = block.lines();
        let header = CommitHeader::parse(lines.next().unwrap_or_default())?;
        if exclude_emails.contains(&header.email) {
            continue;
        }
        commits += 1;

        let files: Vec<String> = lines
            .filter_map(numstat_path)
            .filter(|raw| !is_ignored_column(raw))
            .map(str::to_lowercase)
            .unique()
            .collect();
        if files.is_empty() {
            tracing::debug!("Commit {} touches no counted file", header.sha);
            continue;
        }

        let share = Rational64::new(1, files.len() as i64);
        for file in files {
            match credit.get_mut(&file) {
                Some(sum) => *sum += share,
                None => {
                    credit.insert(file.clone(), share);
                    order.push(file);
                }
            }
        }
    }

    let mut table = SparseTable::new();
    table.set(row, TOTAL_COLUMN, Cell::count(commits))?;
    for file in order {
        if let Some(value) = credit.remove(&file) {
            table.set(row, file, Cell::Number(value))?;
        }
    }
    Ok(table)
}

/// Commit counter driven by a single log query per repository.
#[derive(Debug, Clone)]
pub struct CommitLogCounter {
    /// Git runner.
    git:            Git,
    /// Earliest commit date considered.
    after:          Option<String>,
    /// Latest commit date considered.
    before:         Option<String>,
    /// Authors whose commits are not counted.
    exclude_emails: Vec<String>,
}

impl CommitLogCounter {
    /// Name used in log messages.
    pub const NAME: &'static str = "CommitLogCounter";

    /// Counts commits in the optional `[after, before]` window.
    pub fn new(
        git: Git,
        after: Option<String>,
        before: Option<String>,
        exclude_emails: Vec<String>,
    ) -> Self {
        Self {
            git,
            after,
            before,
            exclude_emails,
        }
    }

    /// Runs the log query for `repo` and parses it into the repository's row.
    pub async fn evaluate_repository(&self, repo: &RepoDescriptor) -> Result<SparseTable> {
        let log = self
            .git
            .numstat_log(&repo.path, self.after.as_deref(), self.before.as_deref())
            .await?;
        parse_commit_log(&log, &repo.name, &self.exclude_emails)
            .with_context(|| format!("Could not parse the log of {}", repo.path.display()))
    }
}
