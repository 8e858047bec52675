//! # reposet
//!
//! Clones or updates a set of student repositories, evaluates every file in
//! them (commit credit, comment density, guarded script runs), and renders
//! the results as sorted progress tables and to-do lists for instructors.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Heterogeneous table cell values
pub mod cell;
/// Path filters and the should-I-run-this-script rules
pub mod classify;
/// TOML configuration and templates
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Per-file and per-repository evaluators
pub mod evaluate;
/// Thin wrappers over the git binary
pub mod git;
/// Tree-sitter based Python source inspection
pub mod parser;
/// Bounded fan-out of per-repository jobs
pub mod pool;
/// Subprocess execution with an explicit working directory
pub mod process;
/// Reference comment set builder
pub mod reference;
/// Text, Markdown, and HTML table writers
pub mod render;
/// Repository descriptors, URL lists, and text decoding
pub mod repo;
/// Per-section report orchestration
pub mod report;
/// The sparse row/column result store
pub mod table;
/// To-do message lists
pub mod todo;
