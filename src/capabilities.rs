//! Side effects the engine performs through injected interfaces.
//!
//! The engine never logs a cycle, announces readiness or starts a process on
//! its own. It calls a [`SyncLog`], a [`NotifyReady`] and a
//! [`LaunchProcess`], so tests can swap in recording fakes and the binary
//! can wire them to `tracing` and real subprocesses.

use anyhow::{Context, Result, bail};
use command_group::CommandGroup;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{Level, debug, error, info, span, trace, warn};

/// One-time readiness signal.
pub trait NotifyReady: Send + Sync {
    /// Called once, after the initial scan has been applied.
    fn ready(&self, manifest: &Path, pattern: &str);
}

/// Fire-and-forget process launch.
pub trait LaunchProcess: Send + Sync {
    /// Starts `command` in `cwd` without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be parsed or spawned. Exit
    /// status is never observed.
    fn launch(&self, command: &str, cwd: &Path) -> Result<()>;
}

/// Sink for per-cycle records: what was added, removed, skipped or failed.
pub trait SyncLog: Send + Sync {
    /// Records `message` at `level`.
    fn record(&self, level: Level, message: &str);
}

/// Formats the readiness announcement.
#[must_use]
pub fn ready_message(manifest: &Path, pattern: &str) -> String {
    format!(
        "CRUD watcher start on \"{}\" watching \"{pattern}\"",
        manifest.display()
    )
}

/// Announces readiness through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReady;

impl NotifyReady for LogReady {
    fn ready(&self, manifest: &Path, pattern: &str) {
        info!("{}", ready_message(manifest, pattern));
    }
}

/// Launches commands through the platform shell as detached process groups.
///
/// The command line is handed to `sh -c` (`cmd /C` on Windows) unchanged, so
/// `&&` chains, pipes and redirections behave as they would in a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

/// Shell program and the flag that makes it run one command string.
#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/C");
/// Shell program and the flag that makes it run one command string.
#[cfg(not(windows))]
const SHELL: (&str, &str) = ("sh", "-c");

impl LaunchProcess for ShellLauncher {
    fn launch(&self, command: &str, cwd: &Path) -> Result<()> {
        let span = span!(Level::DEBUG, "launch", command);
        let _guard = span.enter();

        check_command(command)?;
        let (shell, flag) = SHELL;
        let resolved =
            which::which(shell).with_context(|| format!("Shell '{shell}' not found in PATH"))?;

        let mut group = Command::new(&resolved)
            .arg(flag)
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .group_spawn()
            .with_context(|| format!("Failed to spawn: {command}"))?;

        debug!(shell = %resolved.display(), "Process group spawned");

        // Reap the child so it does not linger as a zombie
        std::thread::spawn(move || match group.wait() {
            Ok(status) => debug!(%status, "onReady command exited"),
            Err(e) => warn!(error = %e, "Failed to wait for onReady command"),
        });

        Ok(())
    }
}

/// Rejects blank commands and unbalanced quoting before a shell is spawned.
///
/// Returns the program word of the command.
///
/// # Errors
///
/// Returns an error for unbalanced quotes or an empty command.
pub fn check_command(command: &str) -> Result<String> {
    let parts = shell_words::split(command)
        .with_context(|| format!("Invalid command syntax: '{command}'"))?;
    match parts.into_iter().next() {
        Some(program) => Ok(program),
        None => bail!("Empty command"),
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLog;

impl SyncLog for NoopLog {
    fn record(&self, _level: Level, _message: &str) {}
}

/// Forwards records to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl SyncLog for TracingLog {
    fn record(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => error!("{message}"),
            Level::WARN => warn!("{message}"),
            Level::INFO => info!("{message}"),
            Level::DEBUG => debug!("{message}"),
            _ => trace!("{message}"),
        }
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<(Level, String)> {
        lock(&self.entries).clone()
    }

    /// True if some record at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        lock(&self.entries)
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl SyncLog for MemoryLog {
    fn record(&self, level: Level, message: &str) {
        lock(&self.entries).push((level, message.to_string()));
    }
}

/// Remembers readiness calls.
#[derive(Debug, Default)]
pub struct RecordingReady {
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingReady {
    /// No calls yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(manifest, pattern)` of every call.
    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        lock(&self.calls).clone()
    }
}

impl NotifyReady for RecordingReady {
    fn ready(&self, manifest: &Path, pattern: &str) {
        lock(&self.calls).push((manifest.to_path_buf(), pattern.to_string()));
    }
}

/// Remembers launches instead of spawning anything.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<(String, PathBuf)>>,
    fail: bool,
}

impl RecordingLauncher {
    /// Launcher whose launches succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose launches are recorded and then fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(command, cwd)` of every launch.
    #[must_use]
    pub fn launches(&self) -> Vec<(String, PathBuf)> {
        lock(&self.launches).clone()
    }
}

impl LaunchProcess for RecordingLauncher {
    fn launch(&self, command: &str, cwd: &Path) -> Result<()> {
        lock(&self.launches).push((command.to_string(), cwd.to_path_buf()));
        if self.fail {
            bail!("launch refused: {command}");
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_message() {
        assert_eq!(
            ready_message(Path::new("/w/App.csproj"), "**/*.ts"),
            "CRUD watcher start on \"/w/App.csproj\" watching \"**/*.ts\""
        );
    }

    #[test]
    fn test_check_command_quoting() {
        let program = check_command("'my tool' run --flag=\"a b\" && echo done").unwrap();
        assert_eq!(program, "my tool");
    }

    #[test]
    fn test_check_command_errors() {
        assert!(check_command("").is_err());
        assert!(check_command("   ").is_err());
        assert!(check_command("echo 'unterminated").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_launcher_runs_command_chain() {
        let dir = tempfile::tempdir().unwrap();
        ShellLauncher
            .launch("touch first && touch second > redirected", dir.path())
            .unwrap();

        let second = dir.path().join("second");
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !second.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        assert!(dir.path().join("first").exists());
        assert!(second.exists());
        assert!(dir.path().join("redirected").exists());
        assert!(!dir.path().join("&&").exists());
    }

    #[test]
    fn test_shell_launcher_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellLauncher.launch("  ", dir.path()).unwrap_err();
        assert!(err.to_string().contains("Empty command"));
    }

    #[test]
    fn test_memory_log() {
        let log = MemoryLog::new();
        log.record(Level::INFO, "added src/a.ts");
        log.record(Level::WARN, "skipped /elsewhere/b.ts");
        assert_eq!(log.entries().len(), 2);
        assert!(log.contains(Level::INFO, "src/a.ts"));
        assert!(!log.contains(Level::ERROR, "src/a.ts"));
    }

    #[test]
    fn test_recording_launcher() {
        let launcher = RecordingLauncher::failing();
        assert!(launcher.launch("echo hi", Path::new("/tmp")).is_err());
        assert_eq!(
            launcher.launches(),
            [("echo hi".to_string(), PathBuf::from("/tmp"))]
        );
    }
}
