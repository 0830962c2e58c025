//! Core types for the record store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Field every record carries naming its kind.
pub const TYPE_NAME_KEY: &str = "typeName";

/// Field every record carries holding its identifier.
pub const ID_KEY: &str = "id";

/// Globally unique, type-tagged identifier of the form `"<prefix>:<suffix>"`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Build an id from a type prefix and an opaque suffix.
    pub fn new(prefix: &str, suffix: &str) -> Self {
        RecordId(format!("{prefix}:{suffix}"))
    }

    /// The part before the first `:`, empty if there is none.
    pub fn prefix(&self) -> &str {
        self.0.split_once(':').map(|(prefix, _)| prefix).unwrap_or("")
    }

    /// The opaque part after the first `:`.
    pub fn suffix(&self) -> &str {
        self.0.split_once(':').map(|(_, suffix)| suffix).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Persistence/sharing class of a record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordScope {
    /// Persisted and shared with every collaborator.
    Document,
    /// Local to one running session.
    Instance,
    /// Ephemeral, per collaborator.
    Presence,
}

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    User,
    Remote,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSource::User => f.write_str("user"),
            ChangeSource::Remote => f.write_str("remote"),
        }
    }
}

/// A typed, identified unit of document state.
///
/// Records are immutable values. The JSON body is shared behind an `Arc`, so
/// cloning is cheap and changing a record means building a new one with
/// [`Record::with_field`] or [`Record::with_fields`].
///
/// Every record carries a string `typeName` and a string `id` whose prefix
/// equals the type name. Both are checked on construction and `typeName`
/// cannot be changed afterwards.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    id: RecordId,
    fields: Arc<Map<String, Value>>,
}

impl Record {
    /// Build a record from a JSON value, checking `typeName` and `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Self::from_map(fields),
            other => Err(StoreError::InvalidRecord(format!(
                "expected an object, got {}",
                crate::validate::describe_value(&other)
            ))),
        }
    }

    /// Build a record from a JSON object, checking `typeName` and `id`.
    pub fn from_map(fields: Map<String, Value>) -> Result<Self> {
        let type_name = match fields.get(TYPE_NAME_KEY) {
            Some(Value::String(s)) => s.as_str(),
            _ => {
                return Err(StoreError::InvalidRecord(
                    "record is missing a string typeName".into(),
                ))
            }
        };
        let id = match fields.get(ID_KEY) {
            Some(Value::String(s)) => RecordId::from(s.as_str()),
            _ => {
                return Err(StoreError::InvalidRecord(format!(
                    "{type_name} record is missing a string id"
                )))
            }
        };
        if id.prefix() != type_name {
            return Err(StoreError::InvalidRecord(format!(
                "id {id} does not belong to type {type_name}"
            )));
        }
        Ok(Self {
            id,
            fields: Arc::new(fields),
        })
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// The record's kind. Always equal to the id prefix.
    pub fn type_name(&self) -> &str {
        self.id.prefix()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Copy of this record with one field replaced.
    ///
    /// `typeName` and `id` are identity and cannot be replaced.
    pub fn with_field(&self, key: impl Into<String>, value: Value) -> Result<Self> {
        let mut patch = Map::new();
        patch.insert(key.into(), value);
        self.with_fields(patch)
    }

    /// Copy of this record with every field in `patch` replaced.
    pub fn with_fields(&self, patch: Map<String, Value>) -> Result<Self> {
        for key in [TYPE_NAME_KEY, ID_KEY] {
            if let Some(value) = patch.get(key) {
                if self.fields.get(key) != Some(value) {
                    return Err(StoreError::InvalidOperation(format!(
                        "cannot change {key} of record {}",
                        self.id
                    )));
                }
            }
        }
        let mut fields = (*self.fields).clone();
        fields.extend(patch);
        Ok(Self {
            id: self.id.clone(),
            fields: Arc::new(fields),
        })
    }

    /// Deserialize the record into a concrete type.
    pub fn to_typed<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value())
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.fields).clone())
    }

    /// Whether two records share the same body allocation.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", Value::Object((*self.fields).clone()))
    }
}

impl TryFrom<Value> for Record {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        Record::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        match Arc::try_unwrap(record.fields) {
            Ok(fields) => Value::Object(fields),
            Err(shared) => Value::Object((*shared).clone()),
        }
    }
}

/// Content hash (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
