#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-section report runs: clone, evaluate, sort, render, and notify.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    config::{ReportConfig, Section},
    constants::TOTAL_COLUMN,
    evaluate::{
        CommentCounter, CommitLogCounter, Evaluator, ScriptRunConfig, ScriptRunner, evaluate_all,
        scripts::locate_python,
    },
    git::Git,
    pool,
    render::TableView,
    repo::{RepoDescriptor, read_url_list, with_user},
    table::SparseTable,
    todo::{self, SectionTables, TodoMessage},
};

/// Output file prefix for commit credit tables.
pub const COMMIT_COUNT_PREFIX: &str = "commit_count";
/// Output file prefix for comment score tables.
pub const POUND_COUNT_PREFIX: &str = "pound_count";
/// Output file prefix for script run tables.
pub const RUN_ALL_PREFIX: &str = "run_all";

/// Tables one section produced.
#[derive(Debug, Clone, Default)]
pub struct SectionResults {
    /// Section name.
    pub section:  String,
    /// Fractional commit credit.
    pub commits:  Option<SparseTable>,
    /// Comment scores.
    pub comments: Option<SparseTable>,
    /// Script run results.
    pub run:      Option<SparseTable>,
    /// To-do messages written, if a list was due.
    pub todo:     Option<Vec<TodoMessage>>,
}

/// Evaluators a section asked for, built before any repository is touched.
#[derive(Debug, Default)]
struct SectionEvaluators {
    /// Commit counter.
    commits:  Option<Arc<Evaluator>>,
    /// Comment counter.
    comments: Option<Arc<Evaluator>>,
    /// Script runner.
    run:      Option<Arc<Evaluator>>,
}

/// Web address of a clone's origin, suitable for `blob/` links.
fn browse_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

/// Runs every configured section of a [`ReportConfig`].
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    /// Loaded configuration.
    config:   ReportConfig,
    /// Git runner.
    git:      Git,
    /// Fan out over repositories.
    parallel: bool,
}

impl ReportBuilder {
    /// Builder using the configured parallelism.
    pub fn new(config: ReportConfig, git: Git) -> Self {
        let parallel = config.operation.parallel;
        Self {
            config,
            git,
            parallel,
        }
    }

    /// Overrides the configured parallelism.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Processes the sections named in `[operation]`, in order.
    pub async fn run(&self) -> Result<Vec<SectionResults>> {
        let sections = self.config.selected_sections()?;
        let mut results = Vec::with_capacity(sections.len());
        for section in &sections {
            let start = Instant::now();
            let result = self
                .process_section(section)
                .await
                .with_context(|| format!("Section `{}` failed", section.name))?;
            info!(
                "Section {} done in {:.3} sec",
                section.name,
                start.elapsed().as_secs_f64()
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Builds the evaluators `section` enables.
    ///
    /// Missing reference comments or interpreter fail here, before cloning.
    fn evaluators(&self, section: &Section) -> Result<SectionEvaluators> {
        let operation = &self.config.operation;
        let mut evaluators = SectionEvaluators::default();

        if section.count_commits {
            evaluators.commits = Some(Arc::new(Evaluator::CommitLog(CommitLogCounter::new(
                self.git.clone(),
                section.after.clone(),
                section.before.clone(),
                operation.exclude_emails.clone(),
            ))));
        }
        if section.pound_count {
            let counter = CommentCounter::excluding_reference(&operation.reference_config)?;
            evaluators.comments = Some(Arc::new(Evaluator::Comments(counter)));
        }
        if section.run_all {
            let config = ScriptRunConfig::builder()
                .python(locate_python(operation.python_path.as_deref())?)
                .maybe_timeout(operation.script_timeout())
                .with_last_commit(section.todo_list_file.is_some())
                .build();
            let runner = ScriptRunner::new(config, Some(self.git.clone()))?;
            evaluators.run = Some(Arc::new(Evaluator::RunEach(runner)));
        }
        Ok(evaluators)
    }

    /// Clones or updates every repository listed for `section`.
    ///
    /// Repositories come back sorted by name.
    pub async fn clone_section(&self, section: &Section) -> Result<Vec<RepoDescriptor>> {
        let urls = read_url_list(&section.list).await?;
        info!("{}: {} repositories", section.name, urls.len());

        let folder = std::path::absolute(&section.folder)
            .with_context(|| format!("Could not resolve {}", section.folder.display()))?;
        let git = self.git.clone();
        let user = self.config.operation.github_id.clone();
        let update = self.config.operation.update_repo;

        let mut repos = Vec::with_capacity(urls.len());
        pool::fan_out(
            urls,
            self.parallel,
            move |url: String| {
                let git = git.clone();
                let folder: PathBuf = folder.clone();
                let clone_url = match &user {
                    Some(user) => with_user(&url, user),
                    None => url.clone(),
                };
                async move { git.clone_or_update(&url, &clone_url, &folder, update).await }
            },
            |repo| {
                repos.push(repo);
                Ok(())
            },
        )
        .await?;
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    /// Evaluates, sorts, renders, and logs one table.
    async fn produce(
        &self,
        evaluator: Arc<Evaluator>,
        repos: &[RepoDescriptor],
        section: &Section,
        prefix: &str,
    ) -> Result<SparseTable> {
        let table = evaluate_all(evaluator, repos.to_vec(), self.parallel).await?;

        let urls: HashMap<String, String> = repos
            .iter()
            .filter_map(|repo| Some((repo.name.clone(), browse_url(repo.url.as_deref()?))))
            .collect();
        let view = TableView::new(&table, table.sorted_rows(TOTAL_COLUMN))
            .with_links(urls, self.config.operation.branch.as_str());
        let paths = view.write_all(&self.config.operation.output_dir, prefix, &section.name)?;
        info!("\n{}", view.summary(&format!("{prefix} {}", section.name)));
        for path in paths {
            info!("Wrote {}", path.display());
        }
        Ok(table)
    }

    /// Runs the enabled evaluators over one section and writes its outputs.
    pub async fn process_section(&self, section: &Section) -> Result<SectionResults> {
        let evaluators = self.evaluators(section)?;
        let repos = self.clone_section(section).await?;
        let mut results = SectionResults {
            section: section.name.clone(),
            ..SectionResults::default()
        };

        if let Some(evaluator) = evaluators.commits {
            let table = self
                .produce(evaluator, &repos, section, COMMIT_COUNT_PREFIX)
                .await?;
            if table.has_header_collision_char('\\') {
                warn!(
                    "'\\' in column titles. Could you please run\n\n    git config core.quotepath false\n\nor\n\n    git config --global core.quotepath false\n"
                );
            }
            results.commits = Some(table);
        }
        if let Some(evaluator) = evaluators.comments {
            results.comments = Some(
                self.produce(evaluator, &repos, section, POUND_COUNT_PREFIX)
                    .await?,
            );
        }
        if let Some(evaluator) = evaluators.run {
            results.run = Some(self.produce(evaluator, &repos, section, RUN_ALL_PREFIX).await?);
        }

        results.todo = self.postprocess(section, &results)?;
        Ok(results)
    }

    /// Writes the section's to-do list when one is configured and due.
    fn postprocess(
        &self,
        section: &Section,
        results: &SectionResults,
    ) -> Result<Option<Vec<TodoMessage>>> {
        let (Some(run), Some(todo_path), Some(last_sent_path)) = (
            results.run.as_ref(),
            section.todo_list_file.as_deref(),
            section.last_sent_file.as_deref(),
        ) else {
            return Ok(None);
        };

        let everything = section.runs_everything();
        let tables = SectionTables {
            run,
            commits: results.commits.as_ref().filter(|_| everything),
            comments: results.comments.as_ref().filter(|_| everything),
        };
        todo::build_and_write(
            tables,
            &section.organization,
            todo_path,
            last_sent_path,
            section.comment_period_days,
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_urls_drop_git_suffix() {
        assert_eq!(browse_url("https://github.com/o/r.git"), "https://github.com/o/r");
        assert_eq!(browse_url("https://github.com/o/r/"), "https://github.com/o/r");
        assert_eq!(browse_url("https://github.com/o/r"), "https://github.com/o/r");
    }

    #[tokio::test]
    async fn missing_reference_fails_before_cloning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reference = dir.path().join("reference.toml");
        let text = format!(
            "[operation]\nsections = [\"a\"]\nreference_config = {:?}\n\
             [sections.a]\nlist = \"does-not-exist.txt\"\nfolder = \"repos\"\npound_count = true\n",
            reference.display().to_string()
        );
        let config = ReportConfig::from_toml(&text).expect("parse");
        let builder = ReportBuilder::new(config, Git::with_program("git"));
        let err = builder.run().await.unwrap_err();
        assert!(
            err.chain()
                .any(|cause| cause.downcast_ref::<crate::config::ConfigError>().is_some())
        );
        assert!(reference.exists());
    }
}
