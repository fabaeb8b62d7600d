//! Coalescing of bursty filesystem notifications.
//!
//! Every notification refreshes a per-path [`PendingChange`]. A periodic
//! sweep hands back the paths that have been quiet for at least the debounce
//! window. A path that keeps changing is therefore traced once, after it
//! settles, and never while a burst is still in progress.
//!
//! The pending map is the only state shared between the event thread and
//! the sweep; [`EventDebouncer`] is a cheap clonable handle to it.

use crate::exclude::ExcludePolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Modified,
}

/// A path waiting for its burst of events to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub path: PathBuf,
    pub kind: EventKind,
    pub last_seen: Instant,
}

#[derive(Debug, Clone)]
pub struct EventDebouncer {
    pending: Arc<Mutex<HashMap<PathBuf, PendingChange>>>,
    window: Duration,
    policy: Arc<ExcludePolicy>,
}

impl EventDebouncer {
    pub fn new(window: Duration, policy: ExcludePolicy) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            window,
            policy: Arc::new(policy),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn policy(&self) -> &ExcludePolicy {
        &self.policy
    }

    /// Record an event observed now.
    pub fn observe(&self, path: &Path, kind: EventKind) -> bool {
        self.observe_at(path, kind, Instant::now())
    }

    /// Record an event observed at `now`. Returns whether the path is now
    /// pending; directories and excluded paths are dropped.
    pub fn observe_at(&self, path: &Path, kind: EventKind, now: Instant) -> bool {
        if path.is_dir() || self.policy.is_excluded(path) {
            return false;
        }
        let mut pending = self.lock();
        pending
            .entry(path.to_path_buf())
            .and_modify(|p| {
                p.last_seen = now;
                p.kind = kind;
            })
            .or_insert_with(|| PendingChange {
                path: path.to_path_buf(),
                kind,
                last_seen: now,
            });
        true
    }

    /// Remove and return every change quiet for at least the window as of
    /// `now`, oldest first. Changes whose file has vanished or become
    /// excluded are removed and dropped.
    pub fn drain_ready(&self, now: Instant) -> Vec<PendingChange> {
        let mut ready: Vec<PendingChange> = {
            let mut pending = self.lock();
            let due: Vec<PathBuf> = pending
                .values()
                .filter(|p| now.saturating_duration_since(p.last_seen) >= self.window)
                .map(|p| p.path.clone())
                .collect();
            due.iter().filter_map(|path| pending.remove(path)).collect()
        };
        ready.retain(|change| {
            let keep = change.path.is_file() && !self.policy.is_excluded(&change.path);
            if !keep {
                debug!(path = %change.path.display(), "dropping settled change");
            }
            keep
        });
        ready.sort_by(|a, b| a.last_seen.cmp(&b.last_seen).then(a.path.cmp(&b.path)));
        ready
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, PendingChange>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
