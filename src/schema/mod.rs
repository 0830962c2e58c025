//! Record types and the schema that aggregates them.
//!
//! A [`RecordType`] describes one kind of record: its validator, migration
//! chain, default properties and scope. A [`Schema`] is the immutable set of
//! all record types, built once at startup and shared (as `Arc<Schema>`) by
//! every store that uses it.

mod record_type;
mod store_schema;

pub use record_type::RecordType;
pub use store_schema::{Schema, SerializedSchema, SCHEMA_FORMAT_VERSION};
