#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Offsets and indent widths cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # vsproj-watch - Project manifest synchronizer
//!
//! Keeps the `<Content Include="..."/>` entries of a `.csproj` file in step
//! with the files that exist on disk. A watcher reports files matching a
//! glob as they appear and disappear; each report runs one
//! read-modify-write cycle on the manifest.
//!
//! ## Features
//!
//! - **Schema-free codec**: the manifest is parsed into a generic element
//!   tree and written back deterministically, with comments, declaration and
//!   text content preserved
//! - **Extension grouping**: new entries join the group that already holds
//!   files with the same extension
//! - **Cleanup**: a group emptied by a removal is removed with it
//! - **Idempotent**: duplicate adds and unknown removals never touch the file
//!
//! ## Architecture
//!
//! - [`document`]: element tree, codec and flattened navigator
//! - [`grouping`]: where new entries go
//! - [`sync`]: read-modify-write cycles and the engine lifecycle
//! - [`watch`]: filesystem event sources
//! - [`capabilities`]: injected side effects (ready signal, process launch, log)
//! - [`config`]: start parameters and the settings file
//!
//! ## Example Usage
//!
//! ```no_run
//! use vsproj_watch::config::{Settings, WatchConfig};
//! use vsproj_watch::sync::SyncEngine;
//! use vsproj_watch::watch::NotifyWatchSource;
//!
//! # fn main() -> vsproj_watch::error::Result<()> {
//! let engine = SyncEngine::new(NotifyWatchSource::new(), Settings::default());
//! let running = engine.start(&WatchConfig::new("App.csproj", "**/*.ts"))?;
//!
//! // ... later, from any thread
//! running.close();
//! running.wait()?;
//! # Ok(())
//! # }
//! ```

/// Injected side effects: readiness signal, process launch and cycle log.
pub mod capabilities;

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Start parameters and the settings file.
pub mod config;

/// Generic element tree, codec and navigator.
pub mod document;

/// Error types.
pub mod error;

/// Extension-based placement of new entries.
pub mod grouping;

/// Manifest cycles and the engine.
pub mod sync;

/// Filesystem event sources.
pub mod watch;

/// Current version of the vsproj-watch binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
