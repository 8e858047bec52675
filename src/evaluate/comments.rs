#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Comment counting evaluators.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};
use num_rational::Rational64;

use super::{FileContext, FileEvaluator};
use crate::{
    cell::Cell,
    classify::is_source_file,
    config::ReferenceConfig,
    constants::TOTAL_COLUMN,
    parser::Parser,
    repo::read_text,
    table::SparseTable,
};

/// How a file's comments turn into a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scoring {
    /// One point per comment.
    Lines,
    /// One point per character of stripped comment text.
    Bytes,
    /// Like [`Scoring::Bytes`], but comments found in the reference set score
    /// zero.
    BytesExcludingReference(HashSet<String>),
}

/// Scores the `#` comments of every source file.
#[derive(Debug, Clone)]
pub struct CommentCounter {
    /// Active scoring rule.
    scoring: Scoring,
}

impl CommentCounter {
    /// Counter using `scoring`.
    pub fn new(scoring: Scoring) -> Self {
        Self { scoring }
    }

    /// Byte counter that ignores the boilerplate listed by the reference
    /// configuration at `reference_config`.
    ///
    /// Fails before any repository is read if the configuration (a template
    /// is written in its place) or the collected comment file is missing.
    pub fn excluding_reference(reference_config: &Path) -> Result<Self> {
        let config = ReferenceConfig::load(reference_config)?;
        let text = std::fs::read_to_string(&config.comment_output_file).with_context(|| {
            format!(
                "Could not read reference comments from {}; run `reposet reference` first",
                config.comment_output_file.display()
            )
        })?;
        Ok(Self::new(Scoring::BytesExcludingReference(reference_set(&text))))
    }

    /// Score of one comment.
    fn comment_points(&self, comment: &str) -> i64 {
        match &self.scoring {
            Scoring::Lines => 1,
            Scoring::Bytes => comment.chars().count() as i64,
            Scoring::BytesExcludingReference(reference) => {
                if reference.contains(comment.trim()) {
                    0
                } else {
                    comment.chars().count() as i64
                }
            }
        }
    }

    /// Score of a file's comments.
    pub fn score_comments(&self, comments: &[String]) -> i64 {
        comments
            .iter()
            .map(|comment| self.comment_points(comment))
            .sum()
    }

    /// Score of a source text.
    pub fn score_source(&self, code: String) -> Result<i64> {
        let parser = Parser::new(code)?;
        Ok(self.score_comments(&parser.comments()))
    }
}

/// Reference comments, one per line, trimmed.
pub fn reference_set(text: &str) -> HashSet<String> {
    text.lines().map(|line| line.trim().to_string()).collect()
}

impl FileEvaluator for CommentCounter {
    fn name(&self) -> &'static str {
        match self.scoring {
            Scoring::Lines => "CommentLineCounter",
            Scoring::Bytes => "CommentByteCounter",
            Scoring::BytesExcludingReference(_) => "CommentByteCounterExcludingReference",
        }
    }

    async fn evaluate_file(&self, file: &FileContext<'_>) -> Result<Cell> {
        if !is_source_file(&file.file_name) {
            return Ok(Cell::NotApplicable);
        }
        let Some(code) = read_text(&file.path).await? else {
            return Ok(Cell::Unreadable);
        };
        Ok(Cell::count(self.score_source(code)?))
    }

    fn repository_total(&self, table: &SparseTable, row: &str) -> Option<Cell> {
        let total: Rational64 = table
            .cells(row)
            .filter(|(column, _)| *column != TOTAL_COLUMN)
            .filter_map(|(_, cell)| cell.as_number())
            .sum();
        Some(Cell::Number(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_scores_count_characters_of_stripped_text() {
        let counter = CommentCounter::new(Scoring::Bytes);
        assert_eq!(counter.score_source("# hello.\nx = 1  # 한글\n".into()).expect("score"), 7);
    }

    #[test]
    fn line_scores_count_comments() {
        let counter = CommentCounter::new(Scoring::Lines);
        assert_eq!(counter.score_source("# a\n# b\nprint()\n".into()).expect("score"), 2);
    }

    #[test]
    fn reference_set_trims_lines() {
        let set = reference_set("  Input a number  \nPrint it\n");
        assert!(set.contains("Input a number"));
        assert!(set.contains("Print it"));
    }

    #[test]
    fn total_skips_non_numeric_cells() {
        let counter = CommentCounter::new(Scoring::Lines);
        let mut table = SparseTable::new();
        table.set("r", "a.py", Cell::count(2)).unwrap();
        table.set("r", "b.txt", Cell::NotApplicable).unwrap();
        table.set("r", "c.py", Cell::Unreadable).unwrap();
        table.set("r", "d.py", Cell::count(3)).unwrap();
        assert_eq!(counter.repository_total(&table, "r"), Some(Cell::count(5)));
    }
}
