//! Versioned record migrations.
//!
//! Each record type owns a linear chain of versions `0..=current`. Step `v`
//! holds an `up` function taking a record from `v - 1` to `v` and a `down`
//! function taking it back. A type may also declare a subtype key; records
//! of that type then carry a second, independent chain per subtype value,
//! applied to the record's nested payload after the base chain.
//!
//! Migration never skips a version: a missing step is a [`Gap`], and a record
//! written by newer code is a [`FutureVersion`]. Both are fatal to loading
//! that one record only.
//!
//! [`Gap`]: crate::error::MigrationError::Gap
//! [`FutureVersion`]: crate::error::MigrationError::FutureVersion

mod chain;
mod migrate;

pub use chain::{Migration, Migrations, RecordVersion, SubTypeMigrations, TypeVersions};
