#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Empty project manifest.
pub const EMPTY_PROJECT: &str = "<Project></Project>";

/// Temporary project directory holding `App.csproj`.
pub struct TestProject {
    pub temp_dir: TempDir,
    pub manifest: PathBuf,
}

impl TestProject {
    /// Create a project whose manifest holds `contents`.
    pub fn new(contents: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let manifest = temp_dir.path().canonicalize()?.join("App.csproj");
        fs::write(&manifest, contents)?;
        Ok(Self { temp_dir, manifest })
    }

    /// Canonical project directory.
    pub fn path(&self) -> &Path {
        self.manifest.parent().unwrap_or(self.temp_dir.path())
    }

    /// Absolute path of `relative` inside the project.
    pub fn file(&self, relative: &str) -> PathBuf {
        self.path().join(relative)
    }

    /// Create `relative` (and its parents) with empty contents.
    pub fn touch(&self, relative: &str) -> Result<PathBuf> {
        let path = self.file(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, "")?;
        Ok(path)
    }

    /// Current manifest text.
    pub fn read_manifest(&self) -> String {
        fs::read_to_string(&self.manifest).unwrap_or_default()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new(EMPTY_PROJECT).expect("Failed to create test project")
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
