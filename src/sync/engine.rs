//! The engine lifecycle: `Idle → Initializing → Watching → Closing → Closed`.
//!
//! [`SyncEngine::start`] validates the start parameters, subscribes to the
//! watch source and applies the initial scan synchronously. It returns once
//! the source reports readiness. From then on a single worker thread applies
//! one read-modify-write cycle per event, in delivery order, until the
//! engine is closed or the source goes away.

use super::store::{FsManifestStore, ManifestStore};
use super::{CycleOutcome, ManifestSync};
use crate::capabilities::{
    LaunchProcess, LogReady, NoopLog, NotifyReady, ShellLauncher, SyncLog,
};
use crate::config::{ResolvedConfig, Settings, WatchConfig};
use crate::error::{ConfigError, Result, SyncError};
use crate::watch::{Subscription, WatchEvent, WatchRequest, WatchSource};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{Level, debug, info, span, warn};

/// How often the worker re-checks for a close while the stream is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Constructed, not started.
    Idle,
    /// Validating parameters and applying the initial scan.
    Initializing,
    /// Processing events.
    Watching,
    /// Unsubscribing.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Watching => "watching",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Side-effect interfaces handed to the engine.
#[derive(Clone)]
pub struct Capabilities {
    /// Readiness signal.
    pub ready: Arc<dyn NotifyReady>,
    /// Launcher for the ready hook.
    pub launcher: Arc<dyn LaunchProcess>,
    /// Per-cycle records.
    pub log: Arc<dyn SyncLog>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ready: Arc::new(LogReady),
            launcher: Arc::new(ShellLauncher),
            log: Arc::new(NoopLog),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

impl Capabilities {
    /// Replaces the readiness signal.
    #[must_use]
    pub fn with_ready(mut self, ready: Arc<dyn NotifyReady>) -> Self {
        self.ready = ready;
        self
    }

    /// Replaces the launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn LaunchProcess>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces the cycle log.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn SyncLog>) -> Self {
        self.log = log;
        self
    }
}

struct Shared {
    state: Mutex<EngineState>,
    close_requested: AtomicBool,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }

    /// Drops the subscription, if any. Called with the state lock held.
    fn unsubscribe(&self) {
        if let Some(mut subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
    }
}

/// Closes an engine from any thread.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("state", &*self.shared.state())
            .finish()
    }
}

impl CloseHandle {
    /// Stops the engine. Idempotent.
    ///
    /// Before the engine reaches `Watching` the close is remembered and
    /// carried out as soon as readiness is reached. Does not wait for an
    /// in-flight cycle.
    pub fn close(&self) {
        let mut state = self.shared.state();
        match *state {
            EngineState::Idle | EngineState::Initializing => {
                let current = *state;
                self.shared.close_requested.store(true, Ordering::SeqCst);
                debug!(state = %current, "close deferred until ready");
            }
            EngineState::Watching => {
                *state = EngineState::Closing;
                self.shared.unsubscribe();
                *state = EngineState::Closed;
                debug!("engine closed");
            }
            EngineState::Closing | EngineState::Closed => {}
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.shared.state()
    }
}

/// An engine that has not been started yet.
pub struct SyncEngine<W, S = FsManifestStore> {
    source: W,
    store: S,
    settings: Settings,
    capabilities: Capabilities,
    working_dir: Option<PathBuf>,
    shared: Arc<Shared>,
}

impl<W: WatchSource> SyncEngine<W> {
    /// Engine writing the manifest on disk.
    pub fn new(source: W, settings: Settings) -> Self {
        Self::with_store(source, FsManifestStore, settings)
    }
}

impl<W, S> SyncEngine<W, S>
where
    W: WatchSource,
    S: ManifestStore + 'static,
{
    /// Engine writing the manifest through `store`.
    pub fn with_store(source: W, store: S, settings: Settings) -> Self {
        Self {
            source,
            store,
            settings,
            capabilities: Capabilities::default(),
            working_dir: None,
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::Idle),
                close_requested: AtomicBool::new(false),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Replaces the side-effect interfaces.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Uses `dir` instead of the process working directory for resolving
    /// relative manifest paths and running the ready hook.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Handle that can close the engine, even before it is started.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.shared.state()
    }

    /// Starts the engine and blocks until the initial scan has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for missing or invalid parameters and
    /// [`SyncError::Watch`] if the watch source cannot be started or ends
    /// before readiness. The engine is `Closed` after any error.
    pub fn start(self, config: &WatchConfig) -> Result<RunningEngine> {
        let span = span!(Level::DEBUG, "start");
        let _guard = span.enter();

        let shared = Arc::clone(&self.shared);
        *shared.state() = EngineState::Initializing;
        self.initialize(config).inspect_err(|e| {
            debug!(error = %e, "start failed");
            let mut state = shared.state();
            shared.unsubscribe();
            *state = EngineState::Closed;
        })
    }

    fn initialize(self, config: &WatchConfig) -> Result<RunningEngine> {
        let Self {
            mut source,
            store,
            settings,
            capabilities,
            working_dir,
            shared,
        } = self;

        let working_dir = match working_dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(ConfigError::Resolve)?,
        };
        let resolved = config.resolve(&settings.watch, &working_dir)?;
        debug!(manifest = %resolved.manifest_path.display(), pattern = %resolved.pattern, "parameters resolved");

        let request = WatchRequest {
            root: resolved.manifest_dir.clone(),
            pattern: resolved.pattern.clone(),
            ignore: settings.watch.ignore.clone(),
            exclude: vec![resolved.manifest_path.clone()],
        };
        let (subscription, events) = source.subscribe(request)?;
        *lock(&shared.subscription) = Some(subscription);

        let cycles = Cycles {
            sync: ManifestSync::new(resolved.manifest_path.clone(), settings.document, store),
            log: Arc::clone(&capabilities.log),
            verbose: resolved.verbose,
        };

        wait_for_ready(&events, &cycles)?;
        enter_watching(&shared, &capabilities, &resolved, &working_dir);

        let handle = CloseHandle {
            shared: Arc::clone(&shared),
        };
        if shared.close_requested.load(Ordering::SeqCst) {
            handle.close();
        }

        let worker = if handle.state() == EngineState::Watching {
            let worker = std::thread::Builder::new()
                .name("vsproj-watch-sync".to_string())
                .spawn(move || run_worker(&shared, &events, &cycles))
                .map_err(|e| SyncError::Watch(format!("Failed to spawn sync worker: {e}")))?;
            Some(worker)
        } else {
            None
        };

        Ok(RunningEngine {
            handle,
            worker,
            manifest: resolved.manifest_path,
            pattern: resolved.pattern,
        })
    }
}

/// Marks the engine as watching, signals readiness and launches the hook in
/// the engine's working directory.
fn enter_watching(
    shared: &Shared,
    capabilities: &Capabilities,
    resolved: &ResolvedConfig,
    working_dir: &Path,
) {
    *shared.state() = EngineState::Watching;
    info!(manifest = %resolved.manifest_path.display(), "watching");

    capabilities
        .ready
        .ready(&resolved.manifest_path, &resolved.pattern);

    if let Some(command) = &resolved.on_ready {
        match capabilities.launcher.launch(command, working_dir) {
            Ok(()) => debug!(%command, "onReady command launched"),
            Err(e) => {
                warn!(%command, error = %e, "onReady command failed to launch");
                capabilities.log.record(
                    Level::WARN,
                    &format!("Failed to launch onReady command \"{command}\": {e:#}"),
                );
            }
        }
    }
}

/// A started engine.
#[derive(Debug)]
pub struct RunningEngine {
    handle: CloseHandle,
    worker: Option<JoinHandle<()>>,
    manifest: PathBuf,
    pattern: String,
}

impl RunningEngine {
    /// Stops the engine. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    /// Handle usable from other threads.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        self.handle.clone()
    }

    /// Absolute manifest path.
    #[must_use]
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// Watch pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Blocks until the worker stops, after a close or when the source ends.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Watch`] if the worker panicked.
    pub fn wait(mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| SyncError::Watch("Sync worker panicked".to_string())),
            None => Ok(()),
        }
    }
}

/// Applies events to the manifest and reports what happened.
struct Cycles<S> {
    sync: ManifestSync<S>,
    log: Arc<dyn SyncLog>,
    verbose: bool,
}

impl<S: ManifestStore> Cycles<S> {
    fn handle(&self, event: WatchEvent) {
        match event {
            WatchEvent::Add(path) => {
                self.trace(&format!("add {}", path.display()));
                let outcome = self.sync.create_content(&path);
                self.report("add", &path, outcome);
            }
            WatchEvent::Remove(path) => {
                self.trace(&format!("unlink {}", path.display()));
                let outcome = self.sync.delete_content(&path);
                self.report("unlink", &path, outcome);
            }
            WatchEvent::Ready => self.trace("duplicate ready signal ignored"),
            WatchEvent::Error(reason) => {
                warn!(%reason, "watch source error");
                self.log.record(Level::WARN, &format!("Watch error: {reason}"));
            }
        }
    }

    fn report(&self, operation: &str, path: &Path, outcome: Result<CycleOutcome>) {
        match outcome {
            Ok(CycleOutcome::Added { relative_path, .. }) => {
                self.log.record(Level::INFO, &format!("Added \"{relative_path}\""));
            }
            Ok(CycleOutcome::Removed {
                relative_path,
                group_removed,
            }) => {
                let suffix = if group_removed { " and its empty group" } else { "" };
                self.log
                    .record(Level::INFO, &format!("Removed \"{relative_path}\"{suffix}"));
            }
            Ok(CycleOutcome::AlreadyPresent { relative_path }) => {
                self.trace(&format!("\"{relative_path}\" already listed"));
            }
            Ok(CycleOutcome::NotPresent { relative_path }) => {
                self.trace(&format!("\"{relative_path}\" not listed"));
            }
            Ok(CycleOutcome::OutsideManifest(path)) => {
                self.log.record(
                    Level::WARN,
                    &format!("Skipped {}: outside the manifest directory", path.display()),
                );
            }
            Ok(CycleOutcome::NonUnicodePath(path)) => {
                self.log.record(
                    Level::WARN,
                    &format!("Skipped {}: path is not valid UTF-8", path.display()),
                );
            }
            Err(e) => {
                warn!(operation, path = %path.display(), error = %e, "cycle failed");
                self.log.record(
                    Level::ERROR,
                    &format!("Failed to {operation} {}: {e}", path.display()),
                );
            }
        }
    }

    fn trace(&self, message: &str) {
        if self.verbose {
            self.log.record(Level::DEBUG, message);
        }
    }
}

/// Applies initial-scan events until the source reports readiness.
fn wait_for_ready<S: ManifestStore>(events: &Receiver<WatchEvent>, cycles: &Cycles<S>) -> Result<()> {
    loop {
        match events.recv() {
            Ok(WatchEvent::Ready) => return Ok(()),
            Ok(event) => cycles.handle(event),
            Err(_) => {
                return Err(SyncError::Watch(
                    "Watch source closed before the initial scan completed".to_string(),
                ));
            }
        }
    }
}

fn run_worker<S: ManifestStore>(shared: &Shared, events: &Receiver<WatchEvent>, cycles: &Cycles<S>) {
    let span = span!(Level::DEBUG, "sync_worker");
    let _guard = span.enter();

    loop {
        if *shared.state() != EngineState::Watching {
            break;
        }
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                // A close may have landed while blocked
                if *shared.state() != EngineState::Watching {
                    break;
                }
                cycles.handle(event);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("watch stream ended");
                let mut state = shared.state();
                if *state == EngineState::Watching {
                    *state = EngineState::Closing;
                    shared.unsubscribe();
                    *state = EngineState::Closed;
                }
                break;
            }
        }
    }
    debug!("sync worker stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
