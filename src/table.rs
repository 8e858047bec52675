#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Sparse two-dimensional store of evaluation results.
//!
//! Rows are repository names, columns are repository-relative file paths or
//! synthetic columns such as [`TOTAL_COLUMN`](crate::constants::TOTAL_COLUMN).
//! A cell may be written more than once only with an identical value, so
//! partial tables produced by concurrent workers can be merged in any order.

use std::collections::{HashMap, HashSet};

use num_rational::Rational64;
use thiserror::Error;

use crate::cell::Cell;

/// Errors raised by [`SparseTable`] writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A second write to the same cell supplied a different value.
    #[error("Overwrite attempt at [{row}][{column}]: current value = {current}, new value = {new}")]
    ConflictingWrite {
        /// Row of the conflicting cell.
        row:     String,
        /// Column of the conflicting cell.
        column:  String,
        /// Value already stored.
        current: Cell,
        /// Value that was rejected.
        new:     Cell,
    },
}

/// Row-key to {column-key: value} mapping with an insertion-ordered header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseTable {
    /// Observed column names in first-seen order.
    columns:     Vec<String>,
    /// Membership index for `columns`.
    column_seen: HashSet<String>,
    /// Table body.
    rows:        HashMap<String, HashMap<String, Cell>>,
}

impl SparseTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column` to the header if it has not been seen yet.
    fn register_column(&mut self, column: &str) {
        if !self.column_seen.contains(column) {
            self.column_seen.insert(column.to_string());
            self.columns.push(column.to_string());
        }
    }

    /// Stores `value` at (`row`, `column`).
    ///
    /// Re-writing an equal value is accepted; a different value fails with
    /// [`TableError::ConflictingWrite`] and leaves the stored value untouched.
    pub fn set(
        &mut self,
        row: impl Into<String>,
        column: impl Into<String>,
        value: Cell,
    ) -> Result<(), TableError> {
        let row = row.into();
        let column = column.into();
        self.register_column(&column);

        let cells = self.rows.entry(row.clone()).or_default();
        match cells.get(&column) {
            None => {
                cells.insert(column, value);
                Ok(())
            }
            Some(current) if *current == value => {
                tracing::debug!("Identical rewrite at [{row}][{column}] = {value}");
                Ok(())
            }
            Some(current) => Err(TableError::ConflictingWrite {
                row,
                column,
                current: current.clone(),
                new: value,
            }),
        }
    }

    /// Returns the stored value, if any.
    pub fn get(&self, row: &str, column: &str) -> Option<&Cell> {
        self.rows.get(row).and_then(|cells| cells.get(column))
    }

    /// Returns the stored value or `default` when the cell is absent.
    pub fn get_or<'a>(&'a self, row: &str, column: &str, default: &'a Cell) -> &'a Cell {
        self.get(row, column).unwrap_or(default)
    }

    /// Numeric value of a cell, treating absent and non-numeric cells as
    /// `default`.
    pub fn number_or(&self, row: &str, column: &str, default: i64) -> Rational64 {
        self.get(row, column)
            .and_then(Cell::as_number)
            .unwrap_or_else(|| Rational64::from_integer(default))
    }

    /// Integrates `other`, applying the same conflict rule as [`Self::set`].
    pub fn merge(&mut self, other: SparseTable) -> Result<(), TableError> {
        for column in &other.columns {
            self.register_column(column);
        }
        for (row, cells) in other.rows {
            for (column, value) in cells {
                self.set(row.clone(), column, value)?;
            }
        }
        Ok(())
    }

    /// Row keys in the underlying map's iteration order.
    pub fn rows(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.keys().map(String::as_str)
    }

    /// The (column, value) pairs stored for `row`.
    pub fn cells(&self, row: &str) -> impl Iterator<Item = (&str, &Cell)> + '_ {
        self.rows
            .get(row)
            .into_iter()
            .flat_map(|cells| cells.iter().map(|(column, value)| (column.as_str(), value)))
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Observed column names in first-seen order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Observed column names sorted lexicographically, as used for headers.
    pub fn sorted_columns(&self) -> Vec<String> {
        let mut columns = self.columns.clone();
        columns.sort();
        columns
    }

    /// Row keys ordered by descending value of `column`, ties broken by
    /// ascending row name.
    ///
    /// Absent or non-numeric cells count as zero.
    pub fn sorted_rows(&self, column: &str) -> Vec<String> {
        let mut rows: Vec<(Rational64, &String)> = self
            .rows
            .keys()
            .map(|row| (self.number_or(row, column, 0), row))
            .collect();
        rows.sort_by(|(a_value, a_row), (b_value, b_row)| {
            b_value.cmp(a_value).then_with(|| a_row.cmp(b_row))
        });
        rows.into_iter().map(|(_, row)| row.clone()).collect()
    }

    /// Whether any column name contains `ch`.
    ///
    /// Used to spot paths that the version-control tool has escaped.
    pub fn has_header_collision_char(&self, ch: char) -> bool {
        self.columns.iter().any(|column| column.contains(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOTAL_COLUMN;

    #[test]
    fn identical_rewrite_is_accepted() {
        let mut table = SparseTable::new();
        table.set("repo", "a.py", Cell::count(3)).expect("first write");
        let once = table.clone();
        table.set("repo", "a.py", Cell::count(3)).expect("second write");
        assert_eq!(table, once);
    }

    #[test]
    fn conflicting_write_keeps_first_value() {
        let mut table = SparseTable::new();
        table.set("repo", "a.py", Cell::count(3)).expect("first write");
        let err = table.set("repo", "a.py", Cell::count(4)).unwrap_err();

        assert_eq!(
            err,
            TableError::ConflictingWrite {
                row:     "repo".into(),
                column:  "a.py".into(),
                current: Cell::count(3),
                new:     Cell::count(4),
            }
        );
        assert_eq!(table.get("repo", "a.py"), Some(&Cell::count(3)));
    }

    #[test]
    fn columns_deduplicate_in_first_seen_order() {
        let mut table = SparseTable::new();
        table.set("r1", "b.py", Cell::count(1)).unwrap();
        table.set("r2", "a.py", Cell::count(1)).unwrap();
        table.set("r2", "b.py", Cell::count(1)).unwrap();
        assert_eq!(table.columns(), ["b.py", "a.py"]);
        assert_eq!(table.sorted_columns(), ["a.py", "b.py"]);
    }

    #[test]
    fn sorted_rows_by_total_then_name() {
        let mut table = SparseTable::new();
        table.set("a", TOTAL_COLUMN, Cell::count(3)).unwrap();
        table.set("b", TOTAL_COLUMN, Cell::count(5)).unwrap();
        table.set("c", TOTAL_COLUMN, Cell::count(3)).unwrap();
        assert_eq!(table.sorted_rows(TOTAL_COLUMN), ["b", "a", "c"]);
    }

    #[test]
    fn missing_total_sorts_as_zero() {
        let mut table = SparseTable::new();
        table.set("neg", TOTAL_COLUMN, Cell::count(-2)).unwrap();
        table.set("none", "x.py", Cell::NotApplicable).unwrap();
        table.set("pos", TOTAL_COLUMN, Cell::count(1)).unwrap();
        assert_eq!(table.sorted_rows(TOTAL_COLUMN), ["pos", "none", "neg"]);
    }

    #[test]
    fn merge_detects_conflicts() {
        let mut left = SparseTable::new();
        left.set("r", "a.py", Cell::count(1)).unwrap();
        let mut right = SparseTable::new();
        right.set("r", "a.py", Cell::count(2)).unwrap();
        assert!(left.merge(right).is_err());
    }

    #[test]
    fn backslash_in_header_is_detected() {
        let mut table = SparseTable::new();
        table.set("r", "\"\\354\\225.py\"", Cell::count(1)).unwrap();
        assert!(table.has_header_collision_char('\\'));
        assert!(!table.has_header_collision_char('|'));
    }
}
