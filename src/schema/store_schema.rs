//! The immutable set of record types.

use super::RecordType;
use crate::error::{MigrationError, Result, StoreError, ValidationFailure, ValidationPhase};
use crate::migrations::{RecordVersion, TypeVersions};
use crate::types::{Record, RecordScope, TYPE_NAME_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the [`SerializedSchema`] layout itself.
pub const SCHEMA_FORMAT_VERSION: u32 = 1;

/// Current versions of every record type, as written next to persisted data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSchema {
    pub schema_version: u32,
    pub record_versions: BTreeMap<String, TypeVersions>,
}

impl SerializedSchema {
    /// The version marker of a persisted record. Unknown types are version 0.
    pub fn record_version_of(&self, record: &Value) -> RecordVersion {
        record
            .get(TYPE_NAME_KEY)
            .and_then(Value::as_str)
            .and_then(|type_name| self.record_versions.get(type_name))
            .map(|versions| versions.record_version_of(record))
            .unwrap_or_default()
    }
}

/// Mapping from `typeName` to [`RecordType`].
#[derive(Debug)]
pub struct Schema {
    types: BTreeMap<String, RecordType>,
}

impl Schema {
    /// Build a schema. Each type name may appear once.
    pub fn new(record_types: impl IntoIterator<Item = RecordType>) -> Result<Self> {
        let mut types = BTreeMap::new();
        for record_type in record_types {
            let name = record_type.type_name().to_string();
            if types.insert(name.clone(), record_type).is_some() {
                return Err(StoreError::DuplicateRecordType(name));
            }
        }
        Ok(Self { types })
    }

    pub fn record_type(&self, type_name: &str) -> Option<&RecordType> {
        self.types.get(type_name)
    }

    pub fn record_types(&self) -> impl Iterator<Item = &RecordType> {
        self.types.values()
    }

    pub fn scope_of(&self, type_name: &str) -> Option<RecordScope> {
        self.types.get(type_name).map(RecordType::scope)
    }

    fn record_type_of(&self, record: &Value) -> Result<&RecordType> {
        let type_name = record
            .get(TYPE_NAME_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::InvalidRecord("record is missing a string typeName".into()))?;
        self.types
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownRecordType(type_name.to_string()))
    }

    /// Run the record's validator.
    ///
    /// On failure the error carries the phase and both record values.
    /// `is_existing_validation_issue` is set when the record is persisted
    /// data being loaded, or when the record it replaces was already invalid.
    pub fn validate_record(
        &self,
        record: &Value,
        phase: ValidationPhase,
        record_before: Option<&Record>,
    ) -> Result<Record> {
        let record_type = self.record_type_of(record)?;
        match record_type.validate(record) {
            Ok(validated) => Record::from_value(validated),
            Err(error) => {
                let before_was_invalid =
                    record_before.is_some_and(|before| !record_type.validator().is_valid(&before.to_value()));
                Err(ValidationFailure {
                    error,
                    phase,
                    record_before: record_before.map(Record::to_value),
                    record_after: record.clone(),
                    is_existing_validation_issue: phase == ValidationPhase::Initialize
                        || before_was_invalid,
                }
                .into())
            }
        }
    }

    /// Bring a persisted record to the current version of its type.
    pub fn migrate_persisted_record(
        &self,
        record: Value,
        from: RecordVersion,
    ) -> std::result::Result<Value, MigrationError> {
        let record_type = self.migration_target(&record)?;
        record_type
            .migrations()
            .migrate_to_current(record_type.type_name(), record, from)
    }

    /// Move a record between two versions of its type, in either direction.
    pub fn migrate_record(
        &self,
        record: Value,
        from: RecordVersion,
        to: RecordVersion,
    ) -> std::result::Result<Value, MigrationError> {
        let record_type = self.migration_target(&record)?;
        record_type
            .migrations()
            .migrate(record_type.type_name(), record, from, to)
    }

    fn migration_target(&self, record: &Value) -> std::result::Result<&RecordType, MigrationError> {
        let type_name = record
            .get(TYPE_NAME_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.types
            .get(type_name)
            .ok_or_else(|| MigrationError::UnknownRecordType(type_name.to_string()))
    }

    /// Current version of every type.
    pub fn serialize(&self) -> SerializedSchema {
        SerializedSchema {
            schema_version: SCHEMA_FORMAT_VERSION,
            record_versions: self
                .types
                .iter()
                .map(|(name, record_type)| (name.clone(), record_type.migrations().type_versions()))
                .collect(),
        }
    }
}
