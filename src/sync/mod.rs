//! Read-modify-write cycles on the manifest.
//!
//! Every filesystem event runs one cycle: read the manifest fresh, decode it,
//! apply the change, encode and write it back. Nothing is cached between
//! cycles, so edits made to the manifest while the watcher runs are picked up
//! by the next event. A cycle that changes nothing writes nothing.

pub mod engine;
pub mod store;

use crate::config::DocumentSettings;
use crate::document::{Document, NodePath, Schema, decode, encode, flatten};
use crate::error::{Result, SyncError};
use crate::grouping::GroupingPolicy;
use std::path::{Path, PathBuf};
use store::ManifestStore;
use tracing::{Level, debug, span};

pub use engine::{Capabilities, CloseHandle, EngineState, RunningEngine, SyncEngine};
pub use store::{FsManifestStore, MemoryStore};

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new entry was written into the group at `container`.
    Added {
        /// Manifest-relative path of the file.
        relative_path: String,
        /// Path of the group that received the entry.
        container: NodePath,
    },
    /// The entry already existed; the manifest was left untouched.
    AlreadyPresent {
        /// Manifest-relative path of the file.
        relative_path: String,
    },
    /// The entry was removed. `group_removed` is true when its group went with it.
    Removed {
        /// Manifest-relative path of the file.
        relative_path: String,
        /// Whether the now-empty group was dropped as well.
        group_removed: bool,
    },
    /// No entry matched; the manifest was left untouched.
    NotPresent {
        /// Manifest-relative path of the file.
        relative_path: String,
    },
    /// The event path is not below the manifest directory.
    OutsideManifest(PathBuf),
    /// The event path cannot be written into the manifest as text.
    NonUnicodePath(PathBuf),
}

impl CycleOutcome {
    /// True if the cycle wrote the manifest.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::Removed { .. })
    }
}

/// Adds an entry for `relative_path` unless one exists. Returns the group
/// path on change.
pub fn apply_add(document: &mut Document, schema: &Schema, relative_path: &str) -> Option<NodePath> {
    if flatten(&document.root).exists(schema, relative_path) {
        return None;
    }
    Some(GroupingPolicy::new(schema).insert(&mut document.root, relative_path))
}

/// Removes the first entry for `relative_path`. Returns `Some(group_removed)` on change.
///
/// A group whose only child is the entry is removed along with it. Entries
/// sitting directly under the root are removed on their own; the root is
/// never removed.
pub fn apply_remove(document: &mut Document, schema: &Schema, relative_path: &str) -> Option<bool> {
    let (entry_path, group_path) = {
        let flat = flatten(&document.root);
        let id = flat.find_entry(schema, relative_path)?;
        let entry = flat.get(id)?;
        let group = flat.parent(id)?;
        let group_path = (group.parent.is_some() && group.element.children().len() <= 1)
            .then(|| group.path.clone());
        (entry.path.clone(), group_path)
    };

    match group_path {
        Some(group_path) => document.root.remove_at(&group_path).map(|_| true),
        None => document.root.remove_at(&entry_path).map(|_| false),
    }
}

/// Runs cycles against one manifest.
#[derive(Debug)]
pub struct ManifestSync<S> {
    manifest: PathBuf,
    base_dir: PathBuf,
    settings: DocumentSettings,
    store: S,
}

impl<S: ManifestStore> ManifestSync<S> {
    /// Cycles for the manifest at `manifest`, which should be absolute.
    pub fn new(manifest: impl Into<PathBuf>, settings: DocumentSettings, store: S) -> Self {
        let manifest = manifest.into();
        let base_dir = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            manifest,
            base_dir,
            settings,
            store,
        }
    }

    /// The manifest path.
    #[must_use]
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// The directory include paths are relative to.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The storage backend.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Strips the manifest directory from `absolute`.
    ///
    /// Returns `None` for paths outside that directory or equal to it.
    #[must_use]
    pub fn relative_path(&self, absolute: &Path) -> Option<String> {
        self.locate(absolute).ok()
    }

    /// Relative path of `absolute`, or the outcome explaining why it is skipped.
    fn locate(&self, absolute: &Path) -> std::result::Result<String, CycleOutcome> {
        let relative = match absolute.strip_prefix(&self.base_dir) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => return Err(CycleOutcome::OutsideManifest(absolute.to_path_buf())),
        };
        relative
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| CycleOutcome::NonUnicodePath(absolute.to_path_buf()))
    }

    /// Handles a file appearing at `absolute`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read, decoded or written.
    pub fn create_content(&self, absolute: &Path) -> Result<CycleOutcome> {
        let span = span!(Level::DEBUG, "create_content", path = %absolute.display());
        let _guard = span.enter();

        let relative_path = match self.locate(absolute) {
            Ok(relative_path) => relative_path,
            Err(skipped) => return Ok(skipped),
        };

        let mut document = self.load()?;
        let Some(container) = apply_add(&mut document, &self.settings.schema(), &relative_path)
        else {
            debug!(%relative_path, "entry already present");
            return Ok(CycleOutcome::AlreadyPresent { relative_path });
        };
        self.persist(&document)?;

        debug!(%relative_path, ?container, "entry added");
        Ok(CycleOutcome::Added {
            relative_path,
            container,
        })
    }

    /// Handles a file disappearing from `absolute`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read, decoded or written.
    pub fn delete_content(&self, absolute: &Path) -> Result<CycleOutcome> {
        let span = span!(Level::DEBUG, "delete_content", path = %absolute.display());
        let _guard = span.enter();

        let relative_path = match self.locate(absolute) {
            Ok(relative_path) => relative_path,
            Err(skipped) => return Ok(skipped),
        };

        let mut document = self.load()?;
        let Some(group_removed) = apply_remove(&mut document, &self.settings.schema(), &relative_path)
        else {
            debug!(%relative_path, "no entry to remove");
            return Ok(CycleOutcome::NotPresent { relative_path });
        };
        self.persist(&document)?;

        debug!(%relative_path, group_removed, "entry removed");
        Ok(CycleOutcome::Removed {
            relative_path,
            group_removed,
        })
    }

    fn load(&self) -> Result<Document> {
        let text = self.store.read(&self.manifest).map_err(|source| SyncError::Read {
            path: self.manifest.clone(),
            source,
        })?;
        decode(&text).map_err(|source| SyncError::Document {
            path: self.manifest.clone(),
            source,
        })
    }

    fn persist(&self, document: &Document) -> Result<()> {
        let text = encode(document, self.settings.indent);
        self.store
            .write(&self.manifest, &text)
            .map_err(|source| SyncError::Persist {
                path: self.manifest.clone(),
                source,
            })
    }
}
