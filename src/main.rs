#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # reposet
//!
//! `reposet report [CONFIG]` clones or updates every repository listed for
//! each configured section, evaluates them, and writes progress tables next
//! to the configured output directory. `reposet reference [CONFIG]` collects
//! the comments of the reference repositories so the comment counter can
//! ignore boilerplate.

use std::{ffi::OsString, path::PathBuf};

use anyhow::Result;
use bpaf::*;
use dotenvy::dotenv;
use reposet::{
    config::{ReferenceConfig, ReportConfig},
    constants::{DEFAULT_CONFIG_FILE, DEFAULT_REFERENCE_CONFIG_FILE},
    git::Git,
    reference::ReferenceBuilder,
    report::ReportBuilder,
};
use tracing::{Level, info, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Evaluate every configured section
    Report {
        /// Report configuration file
        config:      Option<PathBuf>,
        /// Process repositories one at a time
        no_parallel: bool,
    },
    /// Build the reference comment set
    Reference(Option<PathBuf>),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses an optional configuration path
    fn c() -> impl Parser<Option<PathBuf>> {
        positional::<PathBuf>("CONFIG")
            .help("Configuration file (report also reads $REPOSET_CONFIG)")
            .optional()
    }

    let no_parallel = long("no-parallel")
        .help("Evaluate repositories sequentially")
        .switch();
    let config = c();
    let report = construct!(Cmd::Report {
        no_parallel,
        config
    })
    .to_options()
    .command("report")
    .help("Clone, evaluate, and render every configured section");

    let reference = construct!(Cmd::Reference(c()))
        .to_options()
        .command("reference")
        .help("Collect comments from the reference repositories");

    let cmd = construct!([report, reference]);

    cmd.to_options()
        .descr("Progress reports over sets of student repositories")
        .run()
}

/// The explicit path, else `from_env`, else `default`.
///
/// Only the report command passes `$REPOSET_CONFIG` as `from_env`.
fn config_path(explicit: Option<PathBuf>, from_env: Option<OsString>, default: &str) -> PathBuf {
    explicit
        .or_else(|| from_env.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();
    let git = Git::locate()?;

    match cmd {
        Cmd::Report {
            config,
            no_parallel,
        } => {
            let path = config_path(
                config,
                std::env::var_os("REPOSET_CONFIG"),
                DEFAULT_CONFIG_FILE,
            );
            let config = ReportConfig::load(&path)?;
            let mut builder = ReportBuilder::new(config, git);
            if no_parallel {
                builder = builder.parallel(false);
            }
            let results = builder.run().await?;
            info!("{} sections processed", results.len());
        }
        Cmd::Reference(config) => {
            let path = config_path(config, None, DEFAULT_REFERENCE_CONFIG_FILE);
            let config = ReferenceConfig::load(&path)?;
            ReferenceBuilder::new(config, git).run().await?;
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_environment() {
        let path = config_path(
            Some(PathBuf::from("a.toml")),
            Some(OsString::from("b.toml")),
            DEFAULT_CONFIG_FILE,
        );
        assert_eq!(path, PathBuf::from("a.toml"));
    }

    #[test]
    fn reference_path_ignores_report_environment() {
        let report = config_path(None, Some(OsString::from("fall.toml")), DEFAULT_CONFIG_FILE);
        assert_eq!(report, PathBuf::from("fall.toml"));

        let reference = config_path(None, None, DEFAULT_REFERENCE_CONFIG_FILE);
        assert_eq!(reference, PathBuf::from(DEFAULT_REFERENCE_CONFIG_FILE));
    }
}
