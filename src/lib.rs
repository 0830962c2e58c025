//! # Record Store
//!
//! A reactive, schema-validated record store where every change is tracked
//! as a reversible diff.
//!
//! ## Core Concepts
//!
//! - **Records**: Immutable JSON objects identified by `"<type>:<suffix>"`
//! - **Schema**: Per-type validators, migrations, and scopes
//! - **Diffs**: Added, updated, and removed records, squashable and reversible
//! - **History**: Diffs tagged by source, batched and flushed to listeners
//! - **Migrations**: Versioned up/down steps, with independent subtype chains
//!
//! ## Example
//!
//! ```ignore
//! use record_store::validate::{self, literal, number, object};
//! use record_store::{ChangeSource, Migrations, Record, RecordScope, RecordType, Schema, Store, StoreConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let counter = RecordType::new(
//!     "counter",
//!     validate::model("counter", object([
//!         ("typeName", literal("counter")),
//!         ("id", validate::id_validator("counter")),
//!         ("value", number()),
//!     ])),
//!     Migrations::none(),
//!     RecordScope::Document,
//! );
//! let store = Store::new(Arc::new(Schema::new([counter])?), StoreConfig::default())?;
//!
//! store.add_listener(|entry| println!("{} changed {} records", entry.source, entry.changes.len()));
//!
//! let record = Record::from_value(json!({"typeName": "counter", "id": "counter:1", "value": 1}))?;
//! store.put([record], ChangeSource::User)?;
//!
//! // Listeners hear about pending changes once per tick.
//! store.tick();
//! ```

pub mod diff;
pub mod error;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod signal;
pub mod snapshot;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod validate;

// Re-exports
pub use diff::{
    apply_records_diff, reverse_records_diff, squash_history_entries, squash_record_diffs,
    HistoryAccumulator, HistoryEntry, InterceptorGuard, RecordsDiff,
};
pub use error::{
    MigrationDirection, MigrationError, PathSegment, Result, StoreError, ValidationError,
    ValidationFailure, ValidationPhase,
};
pub use migrations::{Migration, Migrations, RecordVersion, SubTypeMigrations, TypeVersions};
pub use query::StoreQueries;
pub use schema::{RecordType, Schema, SerializedSchema, SCHEMA_FORMAT_VERSION};
pub use signal::{Atom, Computed, FlushScheduler, FlushTask, ImmediateScheduler, TickScheduler};
pub use snapshot::StoreSnapshot;
pub use store::{LoadIssue, Store, StoreConfig};
pub use subscriptions::{
    DropReason, Listener, ListenerFilter, ListenerId, StoreEvent, SubscriptionConfig,
    SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
pub use types::*;
pub use validate::{Validate, Validator};
