//! Portable snapshot of a store's records and schema versions.

use crate::error::Result;
use crate::schema::SerializedSchema;
use crate::types::{Hash, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Records plus the versions they were written at.
///
/// Record bodies are plain JSON so a snapshot written by an older schema
/// can be read back before it is migrated and validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema: SerializedSchema,
    pub records: BTreeMap<RecordId, Value>,
}

impl StoreSnapshot {
    pub fn new(schema: SerializedSchema, records: BTreeMap<RecordId, Value>) -> Self {
        Self { schema, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::StoreError::Deserialization(e.to_string()))
    }

    /// MessagePack encoding with named fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// SHA-256 of the canonical JSON form.
    ///
    /// Map keys are ordered, so equal snapshots hash equally regardless of
    /// insertion order.
    pub fn content_hash(&self) -> Result<Hash> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Hash::from_bytes(&bytes))
    }
}
