//! Source-tagged history entries and the pending-history accumulator.

use super::RecordsDiff;
use crate::types::ChangeSource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A diff tagged with where it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub changes: RecordsDiff,
    pub source: ChangeSource,
}

impl HistoryEntry {
    pub fn new(changes: RecordsDiff, source: ChangeSource) -> Self {
        Self { changes, source }
    }
}

/// Squash contiguous runs of same-source entries.
///
/// Runs are never merged across a source boundary, so `[user, user, remote,
/// user]` becomes three entries in the original order.
pub fn squash_history_entries(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut result: Vec<HistoryEntry> = Vec::new();
    for entry in entries {
        match result.last_mut() {
            Some(current) if current.source == entry.source => {
                current.changes.squash(&entry.changes);
            }
            _ => result.push(entry),
        }
    }
    result
}

type Interceptor = Arc<dyn Fn(&HistoryEntry) + Send + Sync>;
type InterceptorMap = Mutex<BTreeMap<u64, Interceptor>>;

/// Unflushed history, in arrival order.
pub struct HistoryAccumulator {
    entries: Mutex<Vec<HistoryEntry>>,
    interceptors: Arc<InterceptorMap>,
    next_interceptor: AtomicU64,
}

impl HistoryAccumulator {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            interceptors: Arc::new(Mutex::new(BTreeMap::new())),
            next_interceptor: AtomicU64::new(1),
        }
    }

    /// Call `interceptor` with every entry added while the guard lives.
    pub fn intercepting<F>(&self, interceptor: F) -> InterceptorGuard
    where
        F: Fn(&HistoryEntry) + Send + Sync + 'static,
    {
        let id = self.next_interceptor.fetch_add(1, Ordering::SeqCst);
        self.interceptors.lock().insert(id, Arc::new(interceptor));
        InterceptorGuard {
            id,
            interceptors: Arc::downgrade(&self.interceptors),
        }
    }

    pub fn add(&self, entry: HistoryEntry) {
        let interceptors: Vec<Interceptor> = self.interceptors.lock().values().cloned().collect();
        for interceptor in &interceptors {
            interceptor(&entry);
        }
        self.entries.lock().push(entry);
    }

    /// Take every pending entry, squashed by source run.
    pub fn flush(&self) -> Vec<HistoryEntry> {
        let pending = std::mem::take(&mut *self.entries.lock());
        squash_history_entries(pending)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn has_changes(&self) -> bool {
        !self.entries.lock().is_empty()
    }

    /// Number of unsquashed pending entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }
}

impl Default for HistoryAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its interceptor when dropped.
pub struct InterceptorGuard {
    id: u64,
    interceptors: Weak<InterceptorMap>,
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        if let Some(interceptors) = self.interceptors.upgrade() {
            interceptors.lock().remove(&self.id);
        }
    }
}
