#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Syntax-checks every script and runs the ones that look safe to run
//! unattended.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use bon::Builder;
use tracing::warn;

use super::{FileContext, FileEvaluator};
use crate::{
    cell::{Cell, ScriptOutcome, ScriptResult},
    classify::{Decision, ScriptHeuristics, ScriptKind, ScriptSource, is_source_file},
    constants::STDIN_DIGIT_LINES,
    git::Git,
    parser::Parser,
    process::{CommandSpec, Outcome},
    repo::{decode_text, read_text},
    table::SparseTable,
};

/// Finds the interpreter: `preferred` if given, else `python3` or `python`
/// on `PATH`.
pub fn locate_python(preferred: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = preferred {
        return Ok(path.to_path_buf());
    }
    which::which("python3")
        .or_else(|_| which::which("python"))
        .context("Cannot find python3 or python on PATH")
}

/// Inputs and limits for running student scripts.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct ScriptRunConfig {
    /// Interpreter.
    #[builder(into)]
    python:           PathBuf,
    /// Per-invocation limit; unbounded when absent.
    timeout:          Option<Duration>,
    /// First argument given to scripts that read `argv`.
    #[builder(default = "test.txt".to_string())]
    default_input:    String,
    /// File-name prefix to first argument overrides.
    #[builder(default = vec![("ex15".to_string(), "ex15_sample.txt".to_string())])]
    input_overrides:  Vec<(String, String)>,
    /// Folder-name prefix to fixed arguments for scripts that do not read
    /// `argv` themselves.
    #[builder(default = vec![("ex23".to_string(), vec!["utf-8".to_string(), "replace".to_string()])])]
    folder_arguments: Vec<(String, Vec<String>)>,
    /// Files whose name is fed on stdin ahead of the digits, first found wins.
    #[builder(default = vec!["test.txt".to_string(), "ex15_sample.txt".to_string()])]
    stdin_fixtures:   Vec<String>,
    /// Stamp each result with the latest commit touching the file.
    #[builder(default)]
    with_last_commit: bool,
}

impl ScriptRunConfig {
    /// First argument for an `argv` script named `file_name`.
    pub fn default_input_for(&self, file_name: &str) -> &str {
        self.input_overrides
            .iter()
            .find(|(prefix, _)| file_name.starts_with(prefix.as_str()))
            .map_or(self.default_input.as_str(), |(_, input)| input.as_str())
    }

    /// Arguments for a script that unpacks `expected` names from `argv`
    /// (program name included): the default input followed by `a.txt`,
    /// `b.txt`, and so on.
    pub fn argv_arguments(&self, file_name: &str, expected: usize) -> Vec<String> {
        std::iter::once(self.default_input_for(file_name).to_string())
            .chain((0..expected.saturating_sub(2)).map(filler_name))
            .collect()
    }

    /// Fixed arguments for a script in `dir`, chosen by folder-name prefix.
    pub fn plain_arguments(&self, dir: &Path) -> Vec<String> {
        let folder = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.folder_arguments
            .iter()
            .find(|(prefix, _)| folder.starts_with(prefix.as_str()))
            .map(|(_, args)| args.clone())
            .unwrap_or_default()
    }

    /// Standard input for scripts in `dir`: the contents of the first
    /// fixture file present, then the digits 0 to 9, one per line.
    ///
    /// A fixture that cannot be read as text is skipped.
    pub fn stdin_text(&self, dir: &Path) -> String {
        let fixture = self
            .stdin_fixtures
            .iter()
            .map(|name| dir.join(name.as_str()))
            .find(|path| path.is_file())
            .and_then(|path| std::fs::read(path).ok())
            .and_then(decode_text)
            .map(|text| text.trim_end_matches(['\r', '\n']).to_string());
        fixture
            .into_iter()
            .chain((0..STDIN_DIGIT_LINES).map(|digit| digit.to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `a.txt`, `b.txt`, ... for the `index`-th filler argument.
fn filler_name(index: usize) -> String {
    let letter = char::from_u32('a' as u32 + index as u32).unwrap_or('z');
    format!("{letter}.txt")
}

/// The run-each-script evaluator.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    /// Inputs and limits.
    config:     ScriptRunConfig,
    /// Execution guards.
    heuristics: ScriptHeuristics,
    /// Needed only when stamping revisions.
    git:        Option<Git>,
}

impl ScriptRunner {
    /// Builds the evaluator. A git runner is required when
    /// `with_last_commit` is set in `config`.
    pub fn new(config: ScriptRunConfig, git: Option<Git>) -> Result<Self> {
        anyhow::ensure!(
            !config.with_last_commit || git.is_some(),
            "Stamping the last commit needs a git binary"
        );
        Ok(Self {
            config,
            heuristics: ScriptHeuristics::new()?,
            git,
        })
    }

    /// Interpreter invocation inside `dir`.
    fn python_command(&self, dir: &Path, args: Vec<OsString>, stdin: Option<Vec<u8>>) -> CommandSpec {
        CommandSpec::builder()
            .program(self.config.python.clone())
            .args(args)
            .maybe_stdin(stdin)
            .cwd(dir)
            .env(vec![("PYTHONIOENCODING".into(), "utf-8".into())])
            .maybe_deadline(self.config.timeout)
            .build()
    }

    /// Whether the file compiles without any diagnostic output.
    pub async fn check_syntax(&self, file: &FileContext<'_>) -> Result<bool> {
        let args = vec!["-m".into(), "py_compile".into(), file.file_name.clone().into()];
        let spec = self.python_command(&file.dir, args, None);
        match spec.run().await? {
            Outcome::Finished(collected) => Ok(collected.status.success()
                && collected.stdout_text().trim().is_empty()
                && collected.stderr_text().trim().is_empty()),
            Outcome::TimedOut(limit) => {
                warn!(
                    "Syntax check of {} timed out after {}s",
                    file.path.display(),
                    limit.as_secs()
                );
                Ok(false)
            }
        }
    }

    /// Runs the script with `arguments` and synthetic standard input.
    pub async fn run_script(&self, file: &FileContext<'_>, arguments: Vec<String>) -> Result<ScriptResult> {
        let args = std::iter::once(file.file_name.clone())
            .chain(arguments)
            .map(OsString::from)
            .collect();
        let stdin = self.config.stdin_text(&file.dir).into_bytes();
        let spec = self.python_command(&file.dir, args, Some(stdin));

        let outcome = match spec.run().await? {
            Outcome::Finished(collected) => {
                let stdout = collected.stdout_text();
                let stderr = collected.stderr_text();
                if stderr.contains("Error") {
                    self.report_failure(&spec, file, &stderr);
                }
                ScriptOutcome::Ran {
                    stdout: stdout.trim().len(),
                    stderr: stderr.trim().len(),
                }
            }
            Outcome::TimedOut(limit) => {
                warn!("{} timed out in {}", spec.display(), file.dir.display());
                ScriptOutcome::TimedOut {
                    secs: limit.as_secs(),
                }
            }
        };
        Ok(ScriptResult::new(outcome))
    }

    /// Logs a failing run with enough context to reproduce it.
    fn report_failure(&self, spec: &CommandSpec, file: &FileContext<'_>, stderr: &str) {
        warn!(
            "{} failed in {}:\n{}",
            spec.display(),
            file.dir.display(),
            stderr.trim()
        );
        if stderr.contains("FileNotFoundError:") {
            let available: Vec<String> = std::fs::read_dir(&file.dir)
                .map(|entries| {
                    entries
                        .filter_map(|entry| entry.ok())
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            warn!("Files available in {}: {available:?}", file.dir.display());
        }
    }

    /// Checks, and if the heuristics allow it, runs one script.
    async fn check_and_run(&self, file: &FileContext<'_>, code: String) -> Result<ScriptResult> {
        if !self.check_syntax(file).await? {
            return Ok(ScriptResult::new(ScriptOutcome::SyntaxFailed));
        }

        let (decision, expected) = {
            let parser = Parser::new(code)?;
            let source = ScriptSource {
                file_name: &file.file_name,
                parser:    &parser,
            };
            (self.heuristics.decide(&source), parser.expected_argument_count())
        };

        Ok(match decision {
            Decision::CheckOnly(kind) => ScriptResult::new(ScriptOutcome::SyntaxPassed).with_kind(kind),
            Decision::RunWithArguments => {
                let arguments = self.config.argv_arguments(&file.file_name, expected);
                self.run_script(file, arguments)
                    .await?
                    .with_kind(ScriptKind::Argv)
            }
            Decision::Run => {
                let arguments = self.config.plain_arguments(&file.dir);
                self.run_script(file, arguments).await?
            }
        })
    }
}

impl FileEvaluator for ScriptRunner {
    fn name(&self) -> &'static str {
        if self.config.with_last_commit {
            "RunEachScriptWithLastCommit"
        } else {
            "RunEachScript"
        }
    }

    async fn evaluate_file(&self, file: &FileContext<'_>) -> Result<Cell> {
        if !is_source_file(&file.file_name) {
            return Ok(Cell::NotApplicable);
        }
        let Some(code) = read_text(&file.path).await? else {
            return Ok(Cell::Unreadable);
        };

        let mut result = self.check_and_run(file, code).await?;
        if self.config.with_last_commit
            && let Some(git) = &self.git
        {
            result.sha = Some(git.last_sha(&file.dir, Path::new(&file.file_name)).await);
        }
        Ok(Cell::Script(result))
    }

    fn repository_total(&self, table: &SparseTable, row: &str) -> Option<Cell> {
        let total = table
            .cells(row)
            .filter_map(|(_, cell)| cell.as_script())
            .map(ScriptResult::score)
            .sum();
        Some(Cell::count(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoDescriptor;

    fn config() -> ScriptRunConfig {
        ScriptRunConfig::builder().python("python3").build()
    }

    #[test]
    fn argv_arguments_leave_room_for_program_and_default_input() {
        let config = config();
        assert_eq!(config.argv_arguments("ex13.py", 3), ["test.txt", "a.txt"]);
        assert_eq!(config.argv_arguments("ex13.py", 4), ["test.txt", "a.txt", "b.txt"]);
        assert_eq!(config.argv_arguments("ex13.py", 0), ["test.txt"]);
        assert_eq!(config.argv_arguments("ex15.py", 2), ["ex15_sample.txt"]);
    }

    #[test]
    fn folder_prefix_selects_fixed_arguments() {
        let config = config();
        assert_eq!(config.plain_arguments(Path::new("/r/ex23_strings")), ["utf-8", "replace"]);
        assert!(config.plain_arguments(Path::new("/r/ex24")).is_empty());
    }

    #[test]
    fn stdin_starts_with_fixture_contents_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config();
        assert_eq!(config.stdin_text(dir.path()), "0\n1\n2\n3\n4\n5\n6\n7\n8\n9");

        std::fs::write(dir.path().join("ex15_sample.txt"), "sample line\n").expect("write");
        assert!(config.stdin_text(dir.path()).starts_with("sample line\n0\n"));

        std::fs::write(dir.path().join("test.txt"), "first\nsecond\n").expect("write");
        assert!(config.stdin_text(dir.path()).starts_with("first\nsecond\n0\n"));
    }

    #[test]
    fn total_adds_stdout_and_subtracts_stderr() {
        let runner = ScriptRunner::new(config(), None).expect("runner");
        let mut table = SparseTable::new();
        let ran = |stdout, stderr| Cell::Script(ScriptResult::new(ScriptOutcome::Ran { stdout, stderr }));
        table.set("r", "a.py", ran(10, 0)).unwrap();
        table.set("r", "b.py", ran(0, 30)).unwrap();
        table.set("r", "c.py", ran(5, 0)).unwrap();
        table
            .set("r", "d.py", Cell::Script(ScriptResult::new(ScriptOutcome::SyntaxFailed)))
            .unwrap();
        table.set("r", "notes.txt", Cell::NotApplicable).unwrap();
        assert_eq!(runner.repository_total(&table, "r"), Some(Cell::count(1)));
    }

    #[tokio::test]
    async fn unreadable_script_is_not_run_or_stamped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("ex01.py"), b"print('\xc7\xd1')\n").expect("write");
        let config = ScriptRunConfig::builder()
            .python("python3")
            .with_last_commit(true)
            .build();
        let runner = ScriptRunner::new(config, Some(Git::with_program("git"))).expect("runner");
        let repo = RepoDescriptor::from_path(dir.path());
        let file = FileContext {
            repo:      &repo,
            dir:       dir.path().to_path_buf(),
            path:      dir.path().join("ex01.py"),
            file_name: "ex01.py".to_string(),
            column:    "ex01.py".to_string(),
        };
        assert_eq!(runner.evaluate_file(&file).await.expect("evaluate"), Cell::Unreadable);
    }

    #[test]
    fn last_commit_needs_git() {
        let config = ScriptRunConfig::builder()
            .python("python3")
            .with_last_commit(true)
            .build();
        assert!(ScriptRunner::new(config, None).is_err());
    }
}
