#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! TOML configuration for report runs and the reference comment set.
//!
//! A missing file is replaced by a commented template and reported as
//! [`ConfigError::TemplateWritten`] so the operator has something to fill in.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_BRANCH, DEFAULT_REFERENCE_CONFIG_FILE, DEFAULT_SCRIPT_TIMEOUT_SECS,
};

/// Configuration problems detected before any repository is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file did not exist; a template was written in its place.
    #[error("{} did not exist; a template was written there. Fill it in and run again.", .path.display())]
    TemplateWritten {
        /// Location of the new template.
        path: PathBuf,
    },
    /// `[operation].sections` names a section with no table.
    #[error("Section `{section}` is listed in [operation] but has no [sections.{section}] table")]
    MissingSection {
        /// Name of the absent section.
        section: String,
    },
    /// A required key is absent from a section.
    #[error("Section `{section}` is missing required key `{key}`")]
    MissingKey {
        /// Section name.
        section: String,
        /// Missing key.
        key:     &'static str,
    },
}

/// Template written when the report configuration is missing.
pub const REPORT_TEMPLATE: &str = r#"# reposet report configuration

[operation]
# sections to process, in order
sections = ["class_a"]
# fetch and hard-reset existing clones before evaluating
update_repo = true
# evaluate repositories concurrently, one worker per processor
parallel = true
# interpreter used for syntax checks and script runs; found on PATH if unset
# python_path = "/usr/bin/python3"
# commits authored with these addresses are not counted
exclude_emails = []
reference_config = "reference.toml"
# per-script limit in seconds; 0 disables the limit
script_timeout_secs = 60
# user name injected into clone URLs
# github_id = "teaching-assistant"
branch = "master"
output_dir = "."

[sections.class_a]
list = "class_a_urls.txt"
folder = "repos/class_a"
after = "2024-03-01"
before = "2024-06-30"
count_commits = true
pound_count = true
run_all = true
organization = "class-a-org"
todo_list_file = "todo_class_a.json"
last_sent_file = "last_sent_class_a.txt"
comment_period_days = 7.0
"#;

/// Template written when the reference configuration is missing.
pub const REFERENCE_TEMPLATE: &str = r#"# reposet reference comment configuration

# reference repositories are cloned here
folder = "data/ref"
# collected comments are written here, one per line
comment_output_file = "reference_comment.txt"

[urls]
a = "reference repository a url here"
b = "reference repository b url here"

[commits]
a = "reference repository a base hash here"
b = "reference repository b base hash here"
"#;

/// Returns `true`; serde default helper.
fn yes() -> bool {
    true
}

/// Default location of the reference configuration.
fn default_reference_config() -> PathBuf {
    PathBuf::from(DEFAULT_REFERENCE_CONFIG_FILE)
}

/// Default per-script limit.
fn default_timeout() -> u64 {
    DEFAULT_SCRIPT_TIMEOUT_SECS
}

/// Default branch for rendered links.
fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// Default output directory.
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Default minimum days between to-do notifications.
fn default_comment_period() -> f64 {
    7.0
}

/// Writes `template` to `path` and returns the matching error.
fn write_template(path: &Path, template: &str) -> anyhow::Error {
    match std::fs::write(path, template) {
        Ok(()) => ConfigError::TemplateWritten {
            path: path.to_path_buf(),
        }
        .into(),
        Err(e) => anyhow::Error::new(e)
            .context(format!("Could not write template to {}", path.display())),
    }
}

/// Reads and parses a TOML file, writing `template` if it is missing.
fn load_toml<T: for<'de> Deserialize<'de>>(path: &Path, template: &str) -> Result<T> {
    if !path.exists() {
        return Err(write_template(path, template));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Could not parse {}", path.display()))
}

/// `[operation]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Sections to process, in order.
    #[serde(default)]
    pub sections:            Vec<String>,
    /// Update existing clones before evaluating.
    #[serde(default = "yes")]
    pub update_repo:         bool,
    /// Evaluate repositories concurrently.
    #[serde(default = "yes")]
    pub parallel:            bool,
    /// Interpreter override.
    #[serde(default)]
    pub python_path:         Option<PathBuf>,
    /// Author addresses whose commits are ignored.
    #[serde(default)]
    pub exclude_emails:      Vec<String>,
    /// Reference comment configuration.
    #[serde(default = "default_reference_config")]
    pub reference_config:    PathBuf,
    /// Per-script limit in seconds; 0 disables it.
    #[serde(default = "default_timeout")]
    pub script_timeout_secs: u64,
    /// User name injected into clone URLs.
    #[serde(default)]
    pub github_id:           Option<String>,
    /// Branch used in rendered file links.
    #[serde(default = "default_branch")]
    pub branch:              String,
    /// Where rendered tables are written.
    #[serde(default = "default_output_dir")]
    pub output_dir:          PathBuf,
}

impl OperationConfig {
    /// Script deadline, or `None` when unbounded.
    pub fn script_timeout(&self) -> Option<Duration> {
        (self.script_timeout_secs > 0).then(|| Duration::from_secs(self.script_timeout_secs))
    }
}

/// One `[sections.<name>]` table as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionTable {
    /// File listing repository URLs.
    pub list:                Option<PathBuf>,
    /// Clone destination.
    pub folder:              Option<PathBuf>,
    /// Commits before this date are ignored.
    pub after:               Option<String>,
    /// Commits after this date are ignored.
    pub before:              Option<String>,
    /// Run the commit counter.
    #[serde(default)]
    pub count_commits:       bool,
    /// Run the comment counter.
    #[serde(default)]
    pub pound_count:         bool,
    /// Run every script.
    #[serde(default)]
    pub run_all:             bool,
    /// Owner recorded in to-do messages.
    #[serde(default)]
    pub organization:        String,
    /// To-do JSON output.
    pub todo_list_file:      Option<PathBuf>,
    /// Timestamp of the last to-do output.
    pub last_sent_file:      Option<PathBuf>,
    /// Minimum days between to-do outputs.
    #[serde(default = "default_comment_period")]
    pub comment_period_days: f64,
}

/// A validated section ready to run.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name, used in output file names.
    pub name:                String,
    /// File listing repository URLs.
    pub list:                PathBuf,
    /// Clone destination.
    pub folder:              PathBuf,
    /// Lower date bound for commits.
    pub after:               Option<String>,
    /// Upper date bound for commits.
    pub before:              Option<String>,
    /// Run the commit counter.
    pub count_commits:       bool,
    /// Run the comment counter.
    pub pound_count:         bool,
    /// Run every script.
    pub run_all:             bool,
    /// Owner recorded in to-do messages.
    pub organization:        String,
    /// To-do JSON output, if to-do lists are wanted.
    pub todo_list_file:      Option<PathBuf>,
    /// Timestamp file for the to-do throttle.
    pub last_sent_file:      Option<PathBuf>,
    /// Minimum days between to-do outputs.
    pub comment_period_days: f64,
}

impl Section {
    /// Validates `table` as section `name`.
    pub fn from_table(name: &str, table: &SectionTable) -> Result<Self, ConfigError> {
        let required = |value: &Option<PathBuf>, key| {
            value.clone().ok_or_else(|| ConfigError::MissingKey {
                section: name.to_string(),
                key,
            })
        };
        Ok(Self {
            name:                name.to_string(),
            list:                required(&table.list, "list")?,
            folder:              required(&table.folder, "folder")?,
            after:               table.after.clone(),
            before:              table.before.clone(),
            count_commits:       table.count_commits,
            pound_count:         table.pound_count,
            run_all:             table.run_all,
            organization:        table.organization.clone(),
            todo_list_file:      table.todo_list_file.clone(),
            last_sent_file:      table.last_sent_file.clone(),
            comment_period_days: table.comment_period_days,
        })
    }

    /// Whether all three evaluators are enabled.
    pub fn runs_everything(&self) -> bool {
        self.count_commits && self.pound_count && self.run_all
    }
}

/// Whole report configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// `[operation]` table.
    pub operation: OperationConfig,
    /// `[sections.*]` tables.
    #[serde(default)]
    pub sections:  BTreeMap<String, SectionTable>,
}

impl ReportConfig {
    /// Loads `path`, writing a template if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path, REPORT_TEMPLATE)
    }

    /// Parses configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Could not parse report configuration")
    }

    /// The sections named in `[operation]`, validated, in listed order.
    pub fn selected_sections(&self) -> Result<Vec<Section>, ConfigError> {
        self.operation
            .sections
            .iter()
            .map(|name| {
                let table = self
                    .sections
                    .get(name)
                    .ok_or_else(|| ConfigError::MissingSection {
                        section: name.clone(),
                    })?;
                Section::from_table(name, table)
            })
            .collect()
    }
}

/// Reference comment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Reference repositories are cloned here.
    pub folder:              PathBuf,
    /// Collected comments, one per line.
    pub comment_output_file: PathBuf,
    /// Repository URLs by key.
    #[serde(default)]
    pub urls:                BTreeMap<String, String>,
    /// Reference commit per URL key.
    #[serde(default)]
    pub commits:             BTreeMap<String, String>,
}

impl ReferenceConfig {
    /// Loads `path`, writing a template if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path, REFERENCE_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_parse() {
        let report = ReportConfig::from_toml(REPORT_TEMPLATE).expect("report template");
        let sections = report.selected_sections().expect("sections");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].runs_everything());
        assert_eq!(report.operation.script_timeout(), Some(Duration::from_secs(60)));

        let reference: ReferenceConfig = toml::from_str(REFERENCE_TEMPLATE).expect("reference");
        assert_eq!(reference.urls.len(), 2);
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        let config = ReportConfig::from_toml("[operation]\nscript_timeout_secs = 0\n")
            .expect("parse");
        assert_eq!(config.operation.script_timeout(), None);
        assert!(config.operation.parallel);
        assert_eq!(config.operation.branch, "master");
    }

    #[test]
    fn missing_section_and_key_are_reported() {
        let config = ReportConfig::from_toml(
            "[operation]\nsections = [\"a\", \"b\"]\n[sections.a]\nlist = \"urls.txt\"\n",
        )
        .expect("parse");
        let err = config.selected_sections().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "folder", .. }));

        let config = ReportConfig::from_toml("[operation]\nsections = [\"z\"]\n").expect("parse");
        assert!(matches!(
            config.selected_sections().unwrap_err(),
            ConfigError::MissingSection { .. }
        ));
    }

    #[test]
    fn missing_file_writes_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reference.toml");
        let err = ReferenceConfig::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::TemplateWritten { .. })
        ));
        assert!(ReferenceConfig::load(&path).is_ok());
    }
}
