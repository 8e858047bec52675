#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Text, Markdown, and HTML renderings of a [`SparseTable`].

use std::{
    collections::HashMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Panel, Style},
};

use crate::{cell::Cell, constants::TOTAL_COLUMN, table::SparseTable};

/// Stylesheet embedded in HTML output.
const HTML_STYLE: &str = "<head>\n<style>\ntable, th, td {\n    border: 1px solid black;\n}\nth, td {text-align: center;}\ntr:nth-child(even) {background-color: #f2f2f2;}\n</style>\n</head>\n";

/// A table with its display order and link targets.
#[derive(Debug, Clone)]
pub struct TableView<'a> {
    /// Data.
    table:   &'a SparseTable,
    /// Row order.
    rows:    Vec<String>,
    /// Header, sorted lexicographically.
    columns: Vec<String>,
    /// Repository URL by row name.
    urls:    HashMap<String, String>,
    /// Branch used in file links.
    branch:  String,
}

impl<'a> TableView<'a> {
    /// View of `table` with rows in `rows` order and no links.
    pub fn new(table: &'a SparseTable, rows: Vec<String>) -> Self {
        Self {
            table,
            rows,
            columns: table.sorted_columns(),
            urls: HashMap::new(),
            branch: crate::constants::DEFAULT_BRANCH.to_string(),
        }
    }

    /// Adds repository URLs used to link row labels and cells.
    pub fn with_links(mut self, urls: HashMap<String, String>, branch: impl Into<String>) -> Self {
        self.urls = urls;
        self.branch = branch.into();
        self
    }

    /// Stored cell, if any.
    fn cell(&self, row: &str, column: &str) -> Option<&Cell> {
        self.table.get(row, column)
    }

    /// Rendered cell text; absent cells are empty.
    fn text(&self, row: &str, column: &str) -> String {
        self.cell(row, column)
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Link to `column` in repository `row`, unless the column is synthetic
    /// or the repository URL is unknown.
    fn file_url(&self, row: &str, column: &str) -> Option<String> {
        if column.starts_with(' ') {
            return None;
        }
        self.urls
            .get(row)
            .map(|url| format!("{url}/blob/{}/{column}", self.branch))
    }

    /// Tab-separated rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for column in &self.columns {
            let _ = write!(out, "\t{column}");
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            for column in &self.columns {
                let _ = write!(out, "\t{}", self.text(row, column));
            }
            out.push('\n');
        }
        out
    }

    /// Pipe-table rendering with right/center alignment markers.
    pub fn render_markdown(&self) -> String {
        let mut first = String::from("|  ");
        let mut second = String::from("|:-");
        for column in &self.columns {
            let _ = write!(first, "  |  {column}");
            second.push_str("-:|:---");
        }
        first.push_str("  |\n");
        second.push_str("-:|\n");

        let mut out = first + &second;
        for row in &self.rows {
            let label = match self.urls.get(row) {
                Some(url) => format!("[{row}]({url})"),
                None => row.clone(),
            };
            let _ = write!(out, "| {label} ");
            for column in &self.columns {
                let value = match (self.cell(row, column), self.file_url(row, column)) {
                    (Some(cell), Some(url)) if cell.is_truthy() => format!("[{cell}]({url})"),
                    (Some(cell), _) => cell.to_string(),
                    (None, _) => String::new(),
                };
                let _ = write!(out, "| {value} ");
            }
            out.push_str(" |\n");
        }
        out
    }

    /// Standalone HTML document with one striped table.
    pub fn render_html(&self) -> String {
        let mut out = String::from("<html>\n");
        out.push_str(HTML_STYLE);
        out.push_str("<table>\n<thead>\n<tr><th> </th><th>");
        let header = self
            .columns
            .iter()
            .map(|column| format!(" {column} "))
            .collect::<Vec<_>>()
            .join("</th><th>");
        out.push_str(&header);
        out.push_str("</th></tr>\n</thead>\n<tbody>\n");

        for row in &self.rows {
            let label = match self.urls.get(row) {
                Some(url) => format!("<a href=\"{url}\">{row}</a>"),
                None => row.clone(),
            };
            let _ = write!(out, "<tr><td> {label} ");
            for column in &self.columns {
                let text = self.text(row, column);
                let value = match self.file_url(row, column) {
                    Some(url) if !text.is_empty() => format!("<a href=\"{url}\">{text}</a>"),
                    _ => text,
                };
                let _ = write!(out, "</td><td> {value} ");
            }
            out.push_str("</td></tr>\n");
        }
        out.push_str("</tbody>\n</table>\n</html>\n");
        out
    }

    /// Short per-repository overview for the log.
    pub fn summary(&self, title: &str) -> String {
        let rows: Vec<SummaryRow> = self
            .rows
            .iter()
            .map(|row| SummaryRow {
                repository: row.clone(),
                total:      self.text(row, TOTAL_COLUMN),
                files:      self
                    .table
                    .cells(row)
                    .filter(|(column, _)| *column != TOTAL_COLUMN)
                    .count(),
            })
            .collect();
        Table::new(rows)
            .with(Panel::header(title))
            .with(Style::modern())
            .to_string()
    }

    /// Writes `<prefix>_<section>.{txt,md,html}` into `dir`.
    pub fn write_all(&self, dir: &Path, prefix: &str, section: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Could not create {}", dir.display()))?;
        let outputs = [
            ("txt", self.render_text()),
            ("md", self.render_markdown()),
            ("html", self.render_html()),
        ];
        outputs
            .into_iter()
            .map(|(ext, body)| {
                let path = dir.join(format!("{prefix}_{section}.{ext}"));
                std::fs::write(&path, body)
                    .with_context(|| format!("Could not write {}", path.display()))?;
                Ok(path)
            })
            .collect()
    }
}

/// One line of the logged overview.
#[derive(Tabled)]
struct SummaryRow {
    /// Repository name.
    #[tabled(rename = "Repository")]
    repository: String,
    /// Rendered total.
    #[tabled(rename = "Total")]
    total:      String,
    /// Number of scored files.
    #[tabled(rename = "Files")]
    files:      usize,
}
