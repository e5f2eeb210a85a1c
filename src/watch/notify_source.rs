//! [`WatchSource`] backed by the OS watcher (`notify`).
//!
//! Raw notify events are noisy: editors write through temp files, renames
//! arrive as one event with two paths, and a directory move reports only the
//! directory. Instead of interpreting event kinds, every path a notify event
//! mentions is reconciled against what is on disk now and against the set
//! of files already reported. That turns any event shape into the add and
//! remove events the engine expects, each reported once per path.

use super::{Subscription, WatchEvent, WatchFilter, WatchRequest, WatchSource};
use crate::error::{Result, SyncError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, debug, span, trace, warn};
use walkdir::WalkDir;

/// Watches a directory tree with the platform's native backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatchSource;

impl NotifyWatchSource {
    /// New source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Files reported so far, plus the channel they are reported on.
///
/// Known-set updates and sends happen under the same lock so the stream
/// order always agrees with the set.
struct PathTracker {
    filter: WatchFilter,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    known: BTreeSet<PathBuf>,
    sender: Sender<WatchEvent>,
}

impl PathTracker {
    fn new(filter: WatchFilter, sender: Sender<WatchEvent>) -> Self {
        Self {
            filter,
            state: Mutex::new(TrackerState {
                known: BTreeSet::new(),
                sender,
            }),
        }
    }

    fn send(&self, event: WatchEvent) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed receiver just means nobody is listening any more
        let _ = state.sender.send(event);
    }

    /// Brings the known set in line with what exists at `path` now.
    fn reconcile(&self, path: &Path) {
        if self.filter.is_ignored(path) {
            trace!(path = %path.display(), "ignored");
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if path.is_dir() {
            for file in self.walk(path) {
                if state.known.insert(file.clone()) {
                    let _ = state.sender.send(WatchEvent::Add(file));
                }
            }
        } else if path.is_file() {
            if self.filter.matches(path) && state.known.insert(path.to_path_buf()) {
                let _ = state.sender.send(WatchEvent::Add(path.to_path_buf()));
            }
        } else {
            // Gone: the path itself, or everything below a vanished directory
            let gone: Vec<PathBuf> = state
                .known
                .iter()
                .filter(|known| known.starts_with(path))
                .cloned()
                .collect();
            for file in gone {
                state.known.remove(&file);
                let _ = state.sender.send(WatchEvent::Remove(file));
            }
        }
    }

    /// Matching files below `dir`, skipping ignored directories.
    fn walk(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| !self.filter.is_ignored(entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            // Same rule as live events: symlinks count by what they point at
            .filter(|entry| entry.path().is_file() && self.filter.matches(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

/// Owns the notify watcher; dropping it ends the event stream.
struct NotifySubscription {
    watcher: Option<RecommendedWatcher>,
}

impl Subscription for NotifySubscription {
    fn unsubscribe(&mut self) {
        if self.watcher.take().is_some() {
            debug!("notify watcher stopped");
        }
    }
}

impl WatchSource for NotifyWatchSource {
    fn subscribe(
        &mut self,
        request: WatchRequest,
    ) -> Result<(Box<dyn Subscription>, Receiver<WatchEvent>)> {
        let span = span!(Level::DEBUG, "subscribe", root = %request.root.display(), pattern = %request.pattern);
        let _guard = span.enter();

        let filter = WatchFilter::new(&request)?;
        let (sender, receiver) = mpsc::channel();
        let tracker = Arc::new(PathTracker::new(filter, sender));

        let handler_tracker = Arc::clone(&tracker);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    trace!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    for path in &event.paths {
                        handler_tracker.reconcile(path);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "notify error");
                    handler_tracker.send(WatchEvent::Error(e.to_string()));
                }
            }
        })
        .map_err(|e| SyncError::Watch(format!("Failed to create watcher: {e}")))?;

        // Watch before scanning so nothing created during the scan is missed
        watcher
            .watch(&request.root, RecursiveMode::Recursive)
            .map_err(|e| {
                SyncError::Watch(format!("Failed to watch {}: {e}", request.root.display()))
            })?;

        tracker.reconcile(&request.root);
        tracker.send(WatchEvent::Ready);
        debug!("initial scan complete");

        let subscription = NotifySubscription {
            watcher: Some(watcher),
        };
        Ok((Box::new(subscription), receiver))
    }
}
