//! Error taxonomy for the manifest synchronizer.
//!
//! Configuration errors abort startup. Everything else is scoped to a single
//! read-modify-write cycle: the engine logs it and keeps watching.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Missing or invalid start parameters. Fatal to startup.
///
/// The `Display` text of the first two variants is consumed by scripts that
/// wrap the binary, so it must stay stable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No manifest path was supplied.
    #[error("Expected csproj")]
    MissingManifest,

    /// No watch pattern was supplied.
    #[error("Expected pattern")]
    MissingPattern,

    /// The manifest path does not exist on disk.
    #[error("Invalid csproj path: {}", .0.display())]
    InvalidManifestPath(PathBuf),

    /// The manifest does not carry one of the accepted extensions.
    #[error("Expected .csproj file, got {}", .0.display())]
    UnsupportedManifestExtension(PathBuf),

    /// The working directory could not be determined while resolving the manifest.
    #[error("Cannot resolve manifest path: {0}")]
    Resolve(#[source] io::Error),
}

/// The manifest text is not well-formed markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed document at byte {offset}: {message}")]
pub struct DocumentError {
    /// Human readable reason.
    pub message: String,
    /// Byte offset into the input where parsing stopped.
    pub offset: usize,
}

impl DocumentError {
    /// Creates a new error at `offset`.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Errors surfaced by the sync engine and its collaborators.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Startup configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The manifest could not be decoded.
    #[error("{}: {source}", .path.display())]
    Document {
        /// Manifest that failed to decode.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: DocumentError,
    },

    /// The manifest could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },

    /// The manifest could not be written back.
    #[error("Failed to write {}: {source}", .path.display())]
    Persist {
        /// Manifest path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },

    /// The watch source failed or closed unexpectedly.
    #[error("Watch error: {0}")]
    Watch(String),
}

/// Convenience alias used across the crate.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
