//! Command-line interface definitions for vsproj-watch.
//!
//! The CLI definition is shared between the main binary and build tools
//! (like xtask) for man page generation.
//!
//! Note: Field-level documentation doubles as clap help text, so we allow
//! missing_docs for this module to avoid redundant documentation.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use crate::config::WatchConfig;
use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

/// Main CLI structure for vsproj-watch.
#[derive(Parser, Debug)]
#[command(
    name = "vsproj-watch",
    version = crate::VERSION,
    about = "Keeps a .csproj file's Content entries in sync with the files on disk",
    long_about = "Watches the directory holding a .csproj file and adds or removes \
                  <Content Include=\"...\"/> entries as files matching a glob appear \
                  and disappear. Entries are grouped by file extension."
)]
pub struct Cli {
    /// Project file to keep in sync
    #[arg(long, value_name = "FILE")]
    pub csproj: Option<PathBuf>,

    /// Glob of files to track, relative to the project directory (e.g. "**/*.ts")
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Shell command to run once the initial scan has been applied
    #[arg(long = "onReady", visible_alias = "on-ready", value_name = "COMMAND")]
    pub on_ready: Option<String>,

    /// Log every event, including no-ops
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Settings file (defaults to $VSPROJ_WATCH_CONFIG, then the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

impl Cli {
    /// Engine start parameters carried by the command line.
    #[must_use]
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            manifest_path: self.csproj.clone(),
            pattern: self.pattern.clone(),
            on_ready: self.on_ready.clone(),
            verbose: self.verbose,
        }
    }

    /// Default log filter for the chosen verbosity.
    #[must_use]
    pub const fn log_filter(&self) -> &'static str {
        if self.verbose {
            "vsproj_watch=debug"
        } else if self.quiet {
            "vsproj_watch=warn"
        } else {
            "vsproj_watch=info"
        }
    }
}
