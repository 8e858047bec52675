//! Properties of the sparse result table.

use std::collections::{BTreeMap, BTreeSet};

use num_rational::Rational64;
use reposet::{
    cell::Cell,
    constants::TOTAL_COLUMN,
    table::{SparseTable, TableError},
};

fn snapshot(table: &SparseTable) -> BTreeMap<(String, String), Cell> {
    table
        .rows()
        .flat_map(|row| {
            table
                .cells(row)
                .map(move |(column, cell)| ((row.to_string(), column.to_string()), cell.clone()))
        })
        .collect()
}

fn columns(table: &SparseTable) -> BTreeSet<String> {
    table.columns().iter().cloned().collect()
}

#[test]
fn repeated_identical_writes_are_idempotent() {
    let mut table = SparseTable::new();
    for _ in 0..3 {
        table
            .set("alpha", "a.py", Cell::Number(Rational64::new(1, 3)))
            .expect("identical write");
    }
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.columns(), ["a.py"]);
    assert_eq!(table.get("alpha", "a.py"), Some(&Cell::Number(Rational64::new(1, 3))));
}

#[test]
fn conflicting_write_keeps_first_value() {
    let mut table = SparseTable::new();
    table.set("alpha", "a.py", Cell::count(1)).expect("first write");
    let err = table
        .set("alpha", "a.py", Cell::NotApplicable)
        .expect_err("conflict");
    match err {
        TableError::ConflictingWrite { current, new, .. } => {
            assert_eq!(current, Cell::count(1));
            assert_eq!(new, Cell::NotApplicable);
        }
    }
    assert_eq!(table.get("alpha", "a.py"), Some(&Cell::count(1)));
}

#[test]
fn merge_is_commutative_for_disjoint_partials() {
    let mut a = SparseTable::new();
    a.set("alpha", TOTAL_COLUMN, Cell::count(2)).unwrap();
    a.set("alpha", "a.py", Cell::count(1)).unwrap();
    a.set("shared", "s.py", Cell::count(7)).unwrap();

    let mut b = SparseTable::new();
    b.set("beta", TOTAL_COLUMN, Cell::count(5)).unwrap();
    b.set("beta", "b.py", Cell::Unreadable).unwrap();
    b.set("shared", "s.py", Cell::count(7)).unwrap();

    let mut ab = a.clone();
    ab.merge(b.clone()).expect("a + b");
    let mut ba = b;
    ba.merge(a).expect("b + a");

    assert_eq!(snapshot(&ab), snapshot(&ba));
    assert_eq!(columns(&ab), columns(&ba));
}

#[test]
fn merge_reports_disagreement() {
    let mut a = SparseTable::new();
    a.set("alpha", "a.py", Cell::count(1)).unwrap();
    let mut b = SparseTable::new();
    b.set("alpha", "a.py", Cell::count(2)).unwrap();
    assert!(a.merge(b).is_err());
}

#[test]
fn rows_sort_by_total_then_name() {
    let mut table = SparseTable::new();
    table.set("a", TOTAL_COLUMN, Cell::count(3)).unwrap();
    table.set("b", TOTAL_COLUMN, Cell::count(5)).unwrap();
    table.set("c", TOTAL_COLUMN, Cell::count(3)).unwrap();
    table.set("d", "x.py", Cell::count(9)).unwrap();
    table.set("e", TOTAL_COLUMN, Cell::NotApplicable).unwrap();
    assert_eq!(table.sorted_rows(TOTAL_COLUMN), ["b", "a", "c", "d", "e"]);
}

#[test]
fn total_column_sorts_first_in_header() {
    let mut table = SparseTable::new();
    table.set("a", "week1/a.py", Cell::count(1)).unwrap();
    table.set("a", TOTAL_COLUMN, Cell::count(1)).unwrap();
    table.set("a", "Makefile", Cell::NotApplicable).unwrap();
    assert_eq!(table.sorted_columns(), [TOTAL_COLUMN, "Makefile", "week1/a.py"]);
}
