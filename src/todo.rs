#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! To-do message lists for instructors, throttled by a last-sent record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    cell::Cell,
    constants::{DEFAULT_LAST_SENT_DAYS, NOT_APPLICABLE},
    table::SparseTable,
};

/// Seconds in a day.
const DAY_SECS: f64 = 86_400.0;

/// One message to post on a commit.
///
/// Fields are declared in alphabetical order so the JSON keys come out
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoMessage {
    /// Message body.
    pub message: String,
    /// Organization or user owning the repository.
    pub owner:   String,
    /// Repository name.
    pub repo:    String,
    /// Commit the message refers to.
    pub sha:     String,
}

/// Row names and their columns in a stable order.
fn sorted_cells(table: &SparseTable) -> Vec<(String, String, Cell)> {
    let mut rows: Vec<&str> = table.rows().collect();
    rows.sort_unstable();
    rows.into_iter()
        .flat_map(|row| {
            let mut cells: Vec<_> = table
                .cells(row)
                .map(|(column, cell)| (row.to_string(), column.to_string(), cell.clone()))
                .collect();
            cells.sort_by(|a, b| a.1.cmp(&b.1));
            cells
        })
        .collect()
}

/// One message per script whose syntax check failed.
pub fn grammar_messages(run: &SparseTable, owner: &str) -> Vec<TodoMessage> {
    sorted_cells(run)
        .into_iter()
        .filter_map(|(row, column, cell)| {
            let result = cell.as_script()?;
            result.syntax_failed().then(|| TodoMessage {
                message: format!("Please verify syntax of {column}. (Automatically generated)"),
                owner:   owner.to_string(),
                repo:    row.clone(),
                sha:     result.sha.clone().unwrap_or_else(|| NOT_APPLICABLE.to_string()),
            })
        })
        .collect()
}

/// One message per script that has commits but no substantive comments.
///
/// A missing comment score does not count as zero.
pub fn comment_messages(
    run: &SparseTable,
    commits: &SparseTable,
    comments: &SparseTable,
    owner: &str,
) -> Vec<TodoMessage> {
    let zero = Rational64::from_integer(0);
    sorted_cells(run)
        .into_iter()
        .filter_map(|(row, column, cell)| {
            let result = cell.as_script()?;
            let committed = commits.number_or(&row, &column, 0) > zero;
            let uncommented = comments.number_or(&row, &column, -1) == zero;
            (committed && uncommented).then(|| TodoMessage {
                message: format!(
                    "Please add comments to lines of {column}. (Automatically generated)"
                ),
                owner:   owner.to_string(),
                repo:    row.clone(),
                sha:     result.sha.clone().unwrap_or_else(|| NOT_APPLICABLE.to_string()),
            })
        })
        .collect()
}

/// Unix time recorded in the last-sent file, or ten days ago when the file
/// is missing or unreadable.
pub fn last_sent_secs(path: &Path, now: DateTime<Utc>) -> f64 {
    let fallback = now.timestamp() as f64 - DEFAULT_LAST_SENT_DAYS * DAY_SECS;
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| text.lines().next()?.trim().parse::<f64>().ok())
        .unwrap_or(fallback)
}

/// Whether fewer than `period_days` days have passed since `last_sent`.
pub fn is_too_frequent(last_sent: f64, now: DateTime<Utc>, period_days: f64) -> bool {
    let since_days = (now.timestamp() as f64 - last_sent) / DAY_SECS;
    info!("{since_days:.2} days since the last to-do list");
    since_days < period_days
}

/// Contents of the last-sent file for `now`.
pub fn last_sent_record(now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&Local);
    format!("{}\n{}\n", now.timestamp(), local.format("%a %b %e %H:%M:%S %Y"))
}

/// Writes `body` next to `path` and renames it into place.
fn write_atomically(path: &Path, body: &str) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp: PathBuf = path.with_file_name(tmp_name);
    std::fs::write(&tmp, body).with_context(|| format!("Could not write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Could not move {} to {}", tmp.display(), path.display()))
}

/// Writes the message list as pretty-printed JSON, then the last-sent
/// record.
pub fn write_todo_files(
    messages: &[TodoMessage],
    todo_path: &Path,
    last_sent_path: &Path,
    now: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(messages).context("Could not serialize to-do list")?;
    write_atomically(todo_path, &json)?;
    write_atomically(last_sent_path, &last_sent_record(now))?;
    info!("Wrote {} to-do messages to {}", messages.len(), todo_path.display());
    Ok(())
}

/// Tables a section produced, as inputs to the to-do builders.
#[derive(Debug, Clone, Copy)]
pub struct SectionTables<'a> {
    /// Run-each results.
    pub run:      &'a SparseTable,
    /// Commit credit, when commits were counted.
    pub commits:  Option<&'a SparseTable>,
    /// Comment scores, when comments were counted.
    pub comments: Option<&'a SparseTable>,
}

/// Builds and writes the to-do list unless the last one is too recent.
///
/// Returns the messages written, or `None` when throttled.
pub fn build_and_write(
    tables: SectionTables<'_>,
    owner: &str,
    todo_path: &Path,
    last_sent_path: &Path,
    period_days: f64,
    now: DateTime<Utc>,
) -> Result<Option<Vec<TodoMessage>>> {
    let last_sent = last_sent_secs(last_sent_path, now);
    if is_too_frequent(last_sent, now, period_days) {
        warn!(
            "Skipping to-do list: the last one was written less than {period_days} days ago"
        );
        return Ok(None);
    }

    let mut messages = grammar_messages(tables.run, owner);
    if let (Some(commits), Some(comments)) = (tables.commits, tables.comments) {
        messages.extend(comment_messages(tables.run, commits, comments, owner));
    }
    write_todo_files(&messages, todo_path, last_sent_path, now)?;
    Ok(Some(messages))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::cell::{ScriptOutcome, ScriptResult};

    fn script(outcome: ScriptOutcome, sha: &str) -> Cell {
        let mut result = ScriptResult::new(outcome);
        result.sha = Some(sha.to_string());
        Cell::Script(result)
    }

    #[test]
    fn json_keys_are_sorted() {
        let message = TodoMessage {
            message: "m".into(),
            owner:   "o".into(),
            repo:    "r".into(),
            sha:     "s".into(),
        };
        let json = serde_json::to_string(&message).expect("json");
        assert_eq!(json, r#"{"message":"m","owner":"o","repo":"r","sha":"s"}"#);
    }

    #[test]
    fn grammar_builder_flags_syntax_failures_only() {
        let mut run = SparseTable::new();
        run.set("r", "bad.py", script(ScriptOutcome::SyntaxFailed, "abc")).unwrap();
        run.set("r", "ok.py", script(ScriptOutcome::SyntaxPassed, "def")).unwrap();
        run.set("r", "notes.txt", Cell::NotApplicable).unwrap();
        let messages = grammar_messages(&run, "org");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sha, "abc");
        assert!(messages[0].message.contains("bad.py"));
    }

    #[test]
    fn comment_builder_needs_commits_and_zero_comments() {
        let ran = ScriptOutcome::Ran {
            stdout: 1,
            stderr: 0,
        };
        let mut run = SparseTable::new();
        let mut commits = SparseTable::new();
        let mut comments = SparseTable::new();
        for file in ["a.py", "b.py", "c.py", "d.py"] {
            run.set("r", file, script(ran, "123")).unwrap();
        }
        commits.set("r", "a.py", Cell::Number(Rational64::new(1, 3))).unwrap();
        comments.set("r", "a.py", Cell::count(0)).unwrap();
        commits.set("r", "b.py", Cell::count(1)).unwrap();
        comments.set("r", "b.py", Cell::count(12)).unwrap();
        comments.set("r", "c.py", Cell::count(0)).unwrap();
        commits.set("r", "d.py", Cell::count(2)).unwrap();

        let messages = comment_messages(&run, &commits, &comments, "org");
        let files: Vec<_> = messages.iter().map(|m| m.message.clone()).collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].contains("a.py"));
    }

    #[test]
    fn throttle_uses_ten_day_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = Utc::now();
        let missing = dir.path().join("last_sent.txt");
        let last = last_sent_secs(&missing, now);
        assert!(!is_too_frequent(last, now, 7.0));
        assert!(is_too_frequent(last, now, 11.0));
    }

    #[test]
    fn written_record_throttles_next_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let todo = dir.path().join("todo.json");
        let last = dir.path().join("last_sent.txt");
        let now = Utc::now();
        let mut run = SparseTable::new();
        run.set("r", "bad.py", script(ScriptOutcome::SyntaxFailed, "abc")).unwrap();
        let tables = SectionTables {
            run:      &run,
            commits:  None,
            comments: None,
        };

        let written = build_and_write(tables, "org", &todo, &last, 7.0, now).expect("write");
        assert_eq!(written.map(|m| m.len()), Some(1));
        let parsed: Vec<TodoMessage> =
            serde_json::from_str(&std::fs::read_to_string(&todo).expect("read")).expect("json");
        assert_eq!(parsed[0].repo, "r");

        let later = now + Duration::days(1);
        let again = build_and_write(tables, "org", &todo, &last, 7.0, later).expect("throttled");
        assert!(again.is_none());
    }
}
