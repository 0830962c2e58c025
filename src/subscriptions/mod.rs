//! Delivery of flushed history to observers.
//!
//! Two kinds of observer are supported:
//! - Callback listeners, run synchronously during a flush
//! - Channel subscriptions, fed through a bounded crossbeam channel
//!
//! Both take a [`ListenerFilter`] that narrows delivery by change source
//! and by record scope. A channel subscriber whose buffer fills up is
//! dropped and sent a final [`StoreEvent::Dropped`].
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: ListenerFilter::source(ChangeSource::Remote),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StoreEvent::Changes { entry }) => println!("{} ids changed", entry.changes.len()),
//!         Ok(StoreEvent::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{Listener, SubscriptionManager};
pub use types::{
    DropReason, ListenerFilter, ListenerId, StoreEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId, DEFAULT_BUFFER_SIZE,
};
