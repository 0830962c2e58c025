//! Listener and subscription types.

use crate::diff::{HistoryEntry, RecordsDiff};
use crate::types::{ChangeSource, RecordScope};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Default number of buffered events before a subscriber is dropped.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Which flushed changes a listener or subscription receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerFilter {
    /// Only entries from this source (None = any source).
    pub source: Option<ChangeSource>,

    /// Only records of this scope (None = every scope).
    pub scope: Option<RecordScope>,
}

impl ListenerFilter {
    /// Receive everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only changes made by `source`.
    pub fn source(source: ChangeSource) -> Self {
        Self {
            source: Some(source),
            scope: None,
        }
    }

    /// Only records whose type has `scope`.
    pub fn scope(scope: RecordScope) -> Self {
        Self {
            source: None,
            scope: Some(scope),
        }
    }

    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_scope(mut self, scope: RecordScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The part of `entry` this filter lets through, or None if nothing is left.
    ///
    /// `scope_of` maps a type name to its scope. Records of unknown types are
    /// dropped by any scope filter.
    pub fn apply<'a>(
        &self,
        entry: &'a HistoryEntry,
        scope_of: &dyn Fn(&str) -> Option<RecordScope>,
    ) -> Option<Cow<'a, HistoryEntry>> {
        if self.source.is_some_and(|source| source != entry.source) {
            return None;
        }
        match self.scope {
            None => Some(Cow::Borrowed(entry)),
            Some(scope) => {
                let changes: RecordsDiff = entry
                    .changes
                    .filter(|record| scope_of(record.type_name()) == Some(scope));
                if changes.is_empty() {
                    None
                } else {
                    Some(Cow::Owned(HistoryEntry::new(changes, entry.source)))
                }
            }
        }
    }
}

/// Configuration for a channel subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping the subscriber. Zero is
    /// treated as one.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: ListenerFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            filter: ListenerFilter::default(),
        }
    }
}

/// Events delivered to channel subscriptions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// One squashed run of changes from a flush.
    Changes { entry: HistoryEntry },

    /// The subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The receiving side went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a callback listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.receiver.try_iter().collect()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}
