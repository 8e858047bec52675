#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Values stored in a [`SparseTable`](crate::table::SparseTable) cell.

use std::fmt::Display;

use num_rational::Rational64;

use crate::{classify::ScriptKind, constants::NOT_APPLICABLE};

/// One evaluation result for a (repository, file) pair.
///
/// Absence of a cell is represented by the table itself, not by a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// The evaluator does not apply to this file (e.g. not a source file).
    NotApplicable,
    /// The file content could not be decoded as text.
    Unreadable,
    /// An exact numeric score: a count, a byte total, or fractional commit
    /// credit.
    Number(Rational64),
    /// Outcome of checking and possibly executing a script.
    Script(ScriptResult),
}

impl Cell {
    /// Builds an integral numeric cell.
    pub fn count(value: i64) -> Self {
        Cell::Number(Rational64::from_integer(value))
    }

    /// Returns the numeric value if this is a numeric cell.
    pub fn as_number(&self) -> Option<Rational64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the script result if this is a script cell.
    pub fn as_script(&self) -> Option<&ScriptResult> {
        match self {
            Cell::Script(result) => Some(result),
            _ => None,
        }
    }

    /// Whether the rendered value counts as "present" for linking purposes.
    ///
    /// Zero scores read as empty, everything else as present.
    pub fn is_truthy(&self) -> bool {
        match self {
            Cell::Number(value) => *value != Rational64::from_integer(0),
            _ => true,
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::NotApplicable => write!(f, "{NOT_APPLICABLE}"),
            Cell::Unreadable => write!(f, "{{readable: false}}"),
            Cell::Number(value) => write!(f, "{value}"),
            Cell::Script(result) => write!(f, "{result}"),
        }
    }
}

impl From<ScriptResult> for Cell {
    fn from(result: ScriptResult) -> Self {
        Cell::Script(result)
    }
}

/// What happened when a script was checked and possibly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The compile check reported a problem.
    SyntaxFailed,
    /// The compile check passed and execution was deliberately skipped.
    SyntaxPassed,
    /// The script ran to completion.
    Ran {
        /// Length of trimmed standard output in bytes.
        stdout: usize,
        /// Length of trimmed standard error in bytes.
        stderr: usize,
    },
    /// The script was killed after exceeding the configured limit.
    TimedOut {
        /// The limit that was exceeded, in seconds.
        secs: u64,
    },
}

/// Structured result of the run-each-script evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    /// Outcome of the check/run.
    pub outcome: ScriptOutcome,
    /// Heuristic class that decided how the script was handled, if any.
    pub kind:    Option<ScriptKind>,
    /// Latest revision touching the file, when requested.
    pub sha:     Option<String>,
}

impl ScriptResult {
    /// A result with no heuristic tag and no revision.
    pub fn new(outcome: ScriptOutcome) -> Self {
        Self {
            outcome,
            kind: None,
            sha: None,
        }
    }

    /// Tags the result with the heuristic class that produced it.
    pub fn with_kind(mut self, kind: ScriptKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Whether the compile check failed.
    pub fn syntax_failed(&self) -> bool {
        self.outcome == ScriptOutcome::SyntaxFailed
    }

    /// Contribution of this result to the repository total.
    ///
    /// `+1` for non-empty stdout, `-1` for non-empty stderr or a timeout;
    /// check-only results contribute nothing.
    pub fn score(&self) -> i64 {
        match self.outcome {
            ScriptOutcome::Ran { stdout, stderr } => {
                i64::from(stdout > 0) - i64::from(stderr > 0)
            }
            ScriptOutcome::TimedOut { .. } => -1,
            ScriptOutcome::SyntaxFailed | ScriptOutcome::SyntaxPassed => 0,
        }
    }
}

impl Display for ScriptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields = Vec::new();
        match self.outcome {
            ScriptOutcome::SyntaxFailed => fields.push("grammar_pass: false".to_string()),
            ScriptOutcome::SyntaxPassed => fields.push("grammar_pass: true".to_string()),
            ScriptOutcome::Ran { stdout, stderr } => {
                fields.push(format!("stdout: {stdout}"));
                fields.push(format!("stderr: {stderr}"));
            }
            ScriptOutcome::TimedOut { secs } => fields.push(format!("timed_out: {secs}")),
        }
        if let Some(kind) = self.kind {
            fields.push(format!("type: {kind}"));
        }
        if let Some(sha) = &self.sha {
            fields.push(format!("sha: {sha}"));
        }
        write!(f, "{{{}}}", fields.join(", "))
    }
}
