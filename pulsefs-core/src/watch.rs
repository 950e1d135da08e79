//! One-shot version watches behind long-poll reads.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::node::NodeView;

/// What a released watcher learns about its node.
#[derive(Debug, Clone)]
pub enum WatchOutcome {
    /// The node reached the watched version; carries its state at release
    /// time.
    Updated(NodeView),
    /// The node was deleted while being watched.
    Deleted,
}

#[derive(Debug)]
struct Watch {
    threshold: u64,
    tx: oneshot::Sender<WatchOutcome>,
}

/// Pending watches, keyed by canonical path.
///
/// Sinks are one-shot: a watch is removed the moment it fires. Watches may
/// target paths that do not exist yet (wait-for-create); a threshold of 0 is
/// released by the next observable change, whatever version results. A
/// waiter that goes away simply drops its receiver and the dead sink is
/// pruned on the next firing pass.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: Mutex<HashMap<String, Vec<Watch>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `path` reaching version >= `threshold`.
    pub fn register(&self, path: &str, threshold: u64) -> oneshot::Receiver<WatchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.watches
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(Watch { threshold, tx });
        rx
    }

    /// Release every watch on `path` whose threshold is met by `version`.
    /// The remaining watches stay registered.
    pub fn fire_updated(&self, path: &str, version: u64, view: &NodeView) {
        let mut watches = self.watches.lock();
        let Some(pending) = watches.get_mut(path) else {
            return;
        };
        let mut kept = Vec::with_capacity(pending.len());
        for watch in pending.drain(..) {
            if watch.tx.is_closed() {
                continue;
            }
            if watch.threshold <= version {
                let _ = watch.tx.send(WatchOutcome::Updated(view.clone()));
            } else {
                kept.push(watch);
            }
        }
        if kept.is_empty() {
            watches.remove(path);
        } else {
            *watches.get_mut(path).unwrap() = kept;
        }
    }

    /// Release every watch on `path` with the deleted outcome.
    pub fn fire_deleted(&self, path: &str) {
        if let Some(pending) = self.watches.lock().remove(path) {
            for watch in pending {
                let _ = watch.tx.send(WatchOutcome::Deleted);
            }
        }
    }

    /// Number of paths with at least one pending watch.
    pub fn watched_paths(&self) -> usize {
        self.watches.lock().len()
    }
}
