#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Synthetic per-repository column holding the representative score.
///
/// The leading space makes it sort before every file column.
pub const TOTAL_COLUMN: &str = " total";

/// Marks the start of each commit record in the single-log query.
pub const COMMIT_SPLIT_TOKEN: &str = "__reposet_new_commit_start__";

/// Separates the header fields of each commit record in the single-log query.
pub const FIELD_SPLIT_TOKEN: &str = "__reposet_field_split__";

/// Directory names whose contents are never evaluated.
pub const IGNORED_DIRECTORIES: &[&str] = &[
    ".git",
    "python.xcodeproj",
    ".idea",
    ".vscode",
    "__pycache__",
    ".ipynb_checkpoints",
];

/// Extension of the scripting language under evaluation.
pub const SOURCE_EXTENSION: &str = ".py";

/// Placeholder used wherever a revision or cell has no meaningful value.
pub const NOT_APPLICABLE: &str = "N/A";

/// Default name of the progress report configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "progress.toml";

/// Default name of the reference-repository configuration file.
pub const DEFAULT_REFERENCE_CONFIG_FILE: &str = "reference.toml";

/// Default per-script execution limit in seconds.
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 60;

/// Days assumed since the last notification when no record exists.
pub const DEFAULT_LAST_SENT_DAYS: f64 = 10.0;

/// Number of digit lines fed to scripts that read standard input.
pub const STDIN_DIGIT_LINES: usize = 10;

/// Branch used when linking rendered cells back to repository files.
pub const DEFAULT_BRANCH: &str = "master";
