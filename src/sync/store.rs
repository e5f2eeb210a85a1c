//! Storage seam for the manifest file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Reads and writes manifest text.
pub trait ManifestStore: Send {
    /// Returns the current contents of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Replaces the contents of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be written.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The real filesystem.
///
/// Writes go straight to the manifest. A temp-file-and-rename would show up
/// as extra add/remove events for any pattern that matches the temp name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestStore;

impl ManifestStore for FsManifestStore {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, String>>,
    fail_writes: Mutex<bool>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding one file.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(path, contents);
        store
    }

    /// Overwrites a file without counting it as a write.
    pub fn set(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        lock(&self.files).insert(path.into(), contents.into());
    }

    /// Current contents of a file.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    /// Makes every following write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }
}

impl ManifestStore for MemoryStore {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if *lock(&self.fail_writes) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "writes disabled",
            ));
        }
        self.set(path, contents);
        *lock(&self.writes) += 1;
        Ok(())
    }
}

impl<S: ManifestStore + Sync> ManifestStore for std::sync::Arc<S> {
    fn read(&self, path: &Path) -> io::Result<String> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        (**self).write(path, contents)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::with_file("/p/App.csproj", "<Project/>");
        assert_eq!(store.read(Path::new("/p/App.csproj")).unwrap(), "<Project/>");
        store.write(Path::new("/p/App.csproj"), "<Other/>").unwrap();
        assert_eq!(store.get(Path::new("/p/App.csproj")).as_deref(), Some("<Other/>"));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_memory_store_failures() {
        let store = MemoryStore::new();
        assert_eq!(
            store.read(Path::new("/missing")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        store.fail_writes(true);
        assert!(store.write(Path::new("/x"), "y").is_err());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.csproj");
        FsManifestStore.write(&path, "<Project/>").unwrap();
        assert_eq!(FsManifestStore.read(&path).unwrap(), "<Project/>");
    }
}
