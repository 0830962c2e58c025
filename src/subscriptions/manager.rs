//! Registry of listeners and channel subscriptions.

use crate::diff::HistoryEntry;
use crate::types::RecordScope;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{
    DropReason, ListenerFilter, ListenerId, StoreEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};

/// A callback run once per flushed history entry.
pub type Listener = Arc<dyn Fn(&HistoryEntry) + Send + Sync>;

struct ListenerEntry {
    filter: ListenerFilter,
    callback: Listener,
}

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<StoreEvent>,
}

impl Subscription {
    /// Try to send an event. Fails if the buffer is full or the receiver
    /// is gone.
    fn try_send(&self, event: StoreEvent) -> Result<(), DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => Err(DropReason::Disconnected),
        }
    }
}

/// Delivers flushed history to callbacks and channels.
pub struct SubscriptionManager {
    /// Callbacks in registration order.
    listeners: RwLock<BTreeMap<ListenerId, ListenerEntry>>,
    /// Active channel subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter shared by listener and subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // --- Listeners ---

    pub fn add_listener(&self, filter: ListenerFilter, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.listeners
            .write()
            .insert(id, ListenerEntry { filter, callback });
        debug!(%id, "listener added");
        id
    }

    /// Returns false if the listener was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // --- Channel subscriptions ---

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id());
        // A zero-capacity channel is a rendezvous channel: every try_send
        // would report Full.
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });
        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort; the buffer may be full.
            let _ = sub.try_send(StoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Dispatch ---

    /// Hand one flushed entry to every listener and subscription whose
    /// filter lets part of it through.
    ///
    /// Listeners are snapshotted first and no lock is held while they run,
    /// so a callback may add or remove listeners or mutate the store.
    pub fn dispatch(&self, entry: &HistoryEntry, scope_of: &dyn Fn(&str) -> Option<RecordScope>) {
        let listeners: Vec<(ListenerFilter, Listener)> = self
            .listeners
            .read()
            .values()
            .map(|l| (l.filter, Arc::clone(&l.callback)))
            .collect();

        for (filter, callback) in &listeners {
            if let Some(visible) = filter.apply(entry, scope_of) {
                callback(&visible);
            }
        }

        self.broadcast(entry, scope_of);
    }

    /// Send to matching subscriptions. Drops subscribers that fail to receive.
    fn broadcast(&self, entry: &HistoryEntry, scope_of: &dyn Fn(&str) -> Option<RecordScope>) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                let Some(visible) = sub.config.filter.apply(entry, scope_of) else {
                    continue;
                };
                let event = StoreEvent::Changes {
                    entry: visible.into_owned(),
                };
                if let Err(reason) = sub.try_send(event) {
                    to_remove.push((*id, reason));
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for (id, reason) in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, ?reason, "dropping subscriber");
                    // Might fail too, that's ok.
                    let _ = sub.try_send(StoreEvent::Dropped { reason });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
