//! Filesystem event sources.
//!
//! A [`WatchSource`] turns a [`WatchRequest`] into a stream of
//! [`WatchEvent`]s: one `Add` per matching file found by the initial scan,
//! then `Ready`, then `Add`/`Remove` as files come and go. Sources
//! de-duplicate per absolute path, so the consumer can treat every event as
//! a real change.

pub mod notify_source;

use crate::error::{Result, SyncError};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

pub use notify_source::NotifyWatchSource;

/// Something that happened below the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A matching file appeared (or was found by the initial scan).
    Add(PathBuf),
    /// A previously reported file disappeared.
    Remove(PathBuf),
    /// The initial scan is complete. Sent exactly once.
    Ready,
    /// A non-fatal watcher failure.
    Error(String),
}

/// What to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Directory to watch recursively; the pattern is relative to it.
    pub root: PathBuf,
    /// Glob selecting files, e.g. `**/*.ts`.
    pub pattern: String,
    /// Directory names whose contents are never reported.
    pub ignore: Vec<String>,
    /// Exact paths never reported.
    pub exclude: Vec<PathBuf>,
}

/// Live subscription. Dropping it also stops the stream.
pub trait Subscription: Send {
    /// Stops event delivery. Safe to call more than once.
    fn unsubscribe(&mut self);
}

/// Produces filesystem events for a request.
pub trait WatchSource {
    /// Starts watching.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Watch`] if the pattern is invalid or the
    /// underlying watcher cannot be started.
    fn subscribe(
        &mut self,
        request: WatchRequest,
    ) -> Result<(Box<dyn Subscription>, Receiver<WatchEvent>)>;
}

/// Decides which paths a request covers.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    pattern: Pattern,
    ignore: Vec<String>,
    exclude: Vec<PathBuf>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl WatchFilter {
    /// Compiles the request's pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Watch`] for an invalid glob.
    pub fn new(request: &WatchRequest) -> Result<Self> {
        let pattern = Pattern::new(&request.pattern)
            .map_err(|e| SyncError::Watch(format!("Invalid pattern '{}': {e}", request.pattern)))?;
        Ok(Self {
            root: request.root.clone(),
            pattern,
            ignore: request.ignore.clone(),
            exclude: request.exclude.clone(),
        })
    }

    /// The watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True if `path` lies inside an ignored directory.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        relative.components().any(|component| match component {
            Component::Normal(name) => self.ignore.iter().any(|ignored| name == ignored.as_str()),
            _ => false,
        })
    }

    /// True if a file at `path` should be reported.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        if self.exclude.iter().any(|excluded| excluded == path) || self.is_ignored(path) {
            return false;
        }
        path.strip_prefix(&self.root)
            .is_ok_and(|relative| self.pattern.matches_path_with(relative, MATCH_OPTIONS))
    }
}

/// Channel-driven source for tests and embedding.
///
/// Events are pushed through the paired [`ScriptHandle`]; the source only
/// hands out the receiving end.
#[derive(Debug)]
pub struct ScriptedWatchSource {
    events: Option<Receiver<WatchEvent>>,
    shared: Arc<ScriptShared>,
}

/// Sending side of a [`ScriptedWatchSource`].
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    sender: Sender<WatchEvent>,
    shared: Arc<ScriptShared>,
}

#[derive(Debug, Default)]
struct ScriptShared {
    requests: Mutex<Vec<WatchRequest>>,
    unsubscribed: AtomicBool,
}

struct ScriptSubscription {
    shared: Arc<ScriptShared>,
}

impl ScriptedWatchSource {
    /// A source and the handle that feeds it.
    #[must_use]
    pub fn new() -> (Self, ScriptHandle) {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(ScriptShared::default());
        (
            Self {
                events: Some(receiver),
                shared: Arc::clone(&shared),
            },
            ScriptHandle { sender, shared },
        )
    }
}

impl WatchSource for ScriptedWatchSource {
    fn subscribe(
        &mut self,
        request: WatchRequest,
    ) -> Result<(Box<dyn Subscription>, Receiver<WatchEvent>)> {
        let events = self
            .events
            .take()
            .ok_or_else(|| SyncError::Watch("Source already subscribed".to_string()))?;
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let subscription = ScriptSubscription {
            shared: Arc::clone(&self.shared),
        };
        Ok((Box::new(subscription), events))
    }
}

impl Subscription for ScriptSubscription {
    fn unsubscribe(&mut self) {
        self.shared.unsubscribed.store(true, Ordering::SeqCst);
    }
}

impl ScriptHandle {
    /// Queues an event. Returns false once the source side is gone.
    pub fn send(&self, event: WatchEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Queues `Add(path)`.
    pub fn add(&self, path: impl Into<PathBuf>) -> bool {
        self.send(WatchEvent::Add(path.into()))
    }

    /// Queues `Remove(path)`.
    pub fn remove(&self, path: impl Into<PathBuf>) -> bool {
        self.send(WatchEvent::Remove(path.into()))
    }

    /// Queues `Ready`.
    pub fn ready(&self) -> bool {
        self.send(WatchEvent::Ready)
    }

    /// Requests the source was subscribed with.
    #[must_use]
    pub fn requests(&self) -> Vec<WatchRequest> {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the consumer unsubscribed.
    #[must_use]
    pub fn unsubscribed(&self) -> bool {
        self.shared.unsubscribed.load(Ordering::SeqCst)
    }
}
