//! Start parameters and the optional settings file.
//!
//! [`WatchConfig`] is what a caller hands the engine at start: manifest,
//! pattern, ready hook, verbosity. [`Settings`] is the TOML file that tunes
//! how the manifest is written and what the watcher ignores. Every settings
//! field has a default, so a missing file is the same as an empty one.

use crate::document::Schema;
use crate::document::codec::is_valid_name;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "VSPROJ_WATCH_CONFIG";

/// Settings file path relative to the user config directory.
pub const DEFAULT_CONFIG_PATH: &str = "vsproj-watch/config.toml";

/// Contents of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Settings {
    /// How the manifest is read and written
    #[serde(default)]
    pub document: DocumentSettings,

    /// What the watcher reports
    #[serde(default)]
    pub watch: WatchSettings,
}

/// `[document]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentSettings {
    /// Spaces per nesting level when the manifest is written back
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Group element name
    #[serde(default = "default_container")]
    pub container: String,
    /// Entry element name
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Entry attribute holding the relative path
    #[serde(default = "default_include_attribute")]
    pub include_attribute: String,
}

/// `[watch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchSettings {
    /// Directory names never reported by the watcher
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Accepted manifest extensions, without the dot. Empty accepts anything.
    #[serde(default = "default_manifest_extensions")]
    pub manifest_extensions: Vec<String>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            container: default_container(),
            entry: default_entry(),
            include_attribute: default_include_attribute(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            ignore: default_ignore(),
            manifest_extensions: default_manifest_extensions(),
        }
    }
}

impl DocumentSettings {
    /// Node names the synchronizer works with.
    #[must_use]
    pub fn schema(&self) -> Schema {
        Schema {
            container: self.container.clone(),
            entry: self.entry.clone(),
            include_attribute: self.include_attribute.clone(),
        }
    }
}

impl Settings {
    /// Resolves the settings file location: `VSPROJ_WATCH_CONFIG`, then the
    /// user config directory. `None` if neither is available.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(DEFAULT_CONFIG_PATH))
    }

    /// Loads settings from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file exists but cannot be read
    /// - The file is not valid TOML
    /// - A value fails validation
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parses and validates settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value is invalid.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).context("Failed to parse TOML config")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.document.indent > 16 {
            anyhow::bail!("document.indent must be between 0 and 16");
        }
        for (key, name) in [
            ("document.container", &self.document.container),
            ("document.entry", &self.document.entry),
            ("document.include_attribute", &self.document.include_attribute),
        ] {
            if !is_valid_name(name) {
                anyhow::bail!("{key} is not a valid element or attribute name: {name:?}");
            }
        }
        if self.watch.ignore.iter().any(String::is_empty) {
            anyhow::bail!("watch.ignore must not contain empty names");
        }
        Ok(())
    }
}

/// Parameters supplied when starting the engine.
///
/// The required fields are optional here so that a missing value is
/// reported by the engine, with its stable error text, rather than by
/// whatever built this value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    /// Manifest to keep in sync, absolute or relative to the working directory.
    pub manifest_path: Option<PathBuf>,
    /// Glob, relative to the manifest directory, selecting the files to track.
    pub pattern: Option<String>,
    /// Shell command run in the working directory once the initial scan has
    /// been applied.
    pub on_ready: Option<String>,
    /// Record per-event diagnostics.
    pub verbose: bool,
}

/// A [`WatchConfig`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Canonical, absolute manifest path.
    pub manifest_path: PathBuf,
    /// Directory holding the manifest; include paths are relative to it.
    pub manifest_dir: PathBuf,
    /// Watch glob.
    pub pattern: String,
    /// Ready hook command.
    pub on_ready: Option<String>,
    /// Per-event diagnostics enabled.
    pub verbose: bool,
}

impl WatchConfig {
    /// Config for `manifest_path` watching `pattern`.
    pub fn new(manifest_path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            manifest_path: Some(manifest_path.into()),
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Sets the ready hook.
    #[must_use]
    pub fn with_on_ready(mut self, command: impl Into<String>) -> Self {
        self.on_ready = Some(command.into());
        self
    }

    /// Sets verbosity.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validates the parameters and resolves the manifest against `cwd`.
    ///
    /// Checks run in order: manifest present, pattern present, manifest
    /// extension accepted, manifest exists.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] hit.
    pub fn resolve(&self, settings: &WatchSettings, cwd: &Path) -> Result<ResolvedConfig, ConfigError> {
        let manifest = self
            .manifest_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingManifest)?;
        let pattern = self
            .pattern
            .as_ref()
            .filter(|pattern| !pattern.is_empty())
            .ok_or(ConfigError::MissingPattern)?;

        if !settings.manifest_extensions.is_empty() {
            let accepted = manifest
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    settings
                        .manifest_extensions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
                });
            if !accepted {
                return Err(ConfigError::UnsupportedManifestExtension(manifest.clone()));
            }
        }

        let absolute = cwd.join(manifest);
        let manifest_path = absolute
            .canonicalize()
            .map_err(|_| ConfigError::InvalidManifestPath(absolute.clone()))?;
        if !manifest_path.is_file() {
            return Err(ConfigError::InvalidManifestPath(absolute));
        }
        let manifest_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::InvalidManifestPath(absolute.clone()))?;

        Ok(ResolvedConfig {
            manifest_path,
            manifest_dir,
            pattern: pattern.clone(),
            on_ready: self.on_ready.clone().filter(|command| !command.trim().is_empty()),
            verbose: self.verbose,
        })
    }
}

fn default_indent() -> usize {
    4
}

fn default_container() -> String {
    "ItemGroup".to_string()
}

fn default_entry() -> String {
    "Content".to_string()
}

fn default_include_attribute() -> String {
    "Include".to_string()
}

fn default_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "bin".to_string(),
        "obj".to_string(),
    ]
}

fn default_manifest_extensions() -> Vec<String> {
    vec!["csproj".to_string()]
}
