#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Collects the comments already present in reference (template)
//! repositories so the comment scorer can ignore them.

use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    classify::is_source_file,
    config::ReferenceConfig,
    evaluate::candidate_files,
    git::Git,
    parser::Parser,
    repo::read_text,
};

/// Every comment in the source files under `root`, in walk order.
///
/// Undecodable files are skipped.
pub async fn collect_comments(root: &Path) -> Result<Vec<String>> {
    let mut comments = Vec::new();
    for path in candidate_files(root)? {
        let is_source = path
            .file_name()
            .is_some_and(|name| is_source_file(&name.to_string_lossy()));
        if !is_source {
            continue;
        }
        match read_text(&path).await? {
            Some(code) => comments.extend(Parser::new(code)?.comments()),
            None => warn!("Skipping undecodable {}", path.display()),
        }
    }
    Ok(comments)
}

/// Appends `new` to `existing`, keeping first occurrences only.
pub fn merge_unique(
    existing: impl IntoIterator<Item = String>,
    new: impl IntoIterator<Item = String>,
) -> Vec<String> {
    existing.into_iter().chain(new).unique().collect()
}

/// Builds the reference comment file described by a [`ReferenceConfig`].
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    /// What to clone and where to write.
    config: ReferenceConfig,
    /// Git runner.
    git:    Git,
}

impl ReferenceBuilder {
    /// Builder for `config`.
    pub fn new(config: ReferenceConfig, git: Git) -> Self {
        Self { config, git }
    }

    /// Comments already recorded in the output file.
    fn existing_comments(&self) -> Result<Vec<String>> {
        let path = &self.config.comment_output_file;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Ok(text.lines().map(|line| line.trim().to_string()).collect())
    }

    /// Clones or updates each reference repository, checks out its
    /// reference commit, and rewrites the comment file.
    ///
    /// Returns the number of comments written.
    pub async fn run(&self) -> Result<usize> {
        let folder = std::path::absolute(&self.config.folder)
            .with_context(|| format!("Could not resolve {}", self.config.folder.display()))?;
        let mut comments = self.existing_comments()?;

        for (key, url) in &self.config.urls {
            let commit = self
                .config
                .commits
                .get(key)
                .with_context(|| format!("No reference commit configured for `{key}`"))?;
            info!("{key} {url}/tree/{commit}");

            let repo = self.git.clone_or_update(url, url, &folder, true).await?;
            self.git.checkout(&repo.path, commit).await?;
            comments = merge_unique(comments, collect_comments(&repo.path).await?);
        }

        let path = &self.config.comment_output_file;
        let body: String = comments.iter().map(|line| format!("{line}\n")).collect();
        std::fs::write(path, body).with_context(|| format!("Could not write {}", path.display()))?;
        info!("{} reference comments in {}", comments.len(), path.display());
        Ok(comments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_occurrence_order() {
        let merged = merge_unique(
            ["b".to_string(), "a".to_string()],
            ["a".to_string(), "c".to_string(), "b".to_string()],
        );
        assert_eq!(merged, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn collects_comments_from_source_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join(".ipynb_checkpoints")).expect("dir");
        std::fs::write(root.join("a.py"), "# Read the input\nx = input()  # store it\n")
            .expect("write");
        std::fs::write(root.join(".ipynb_checkpoints/a.py"), "# hidden\n").expect("write");
        std::fs::write(root.join("notes.txt"), "# not python\n").expect("write");

        let comments = collect_comments(root).await.expect("collect");
        assert_eq!(comments, ["Read the input", "store it"]);
    }
}
