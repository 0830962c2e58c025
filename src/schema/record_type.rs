//! One kind of record.

use crate::error::{Result, StoreError, ValidationError};
use crate::migrations::Migrations;
use crate::types::{Record, RecordId, RecordScope, ID_KEY, TYPE_NAME_KEY};
use crate::validate::Validator;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

type DefaultsFn = Arc<dyn Fn() -> Map<String, Value> + Send + Sync>;

/// Schema entry for one `typeName`.
#[derive(Clone)]
pub struct RecordType {
    type_name: String,
    validator: Validator,
    migrations: Migrations,
    scope: RecordScope,
    default_properties: Option<DefaultsFn>,
}

impl RecordType {
    pub fn new(
        type_name: impl Into<String>,
        validator: Validator,
        migrations: Migrations,
        scope: RecordScope,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            validator,
            migrations,
            scope,
            default_properties: None,
        }
    }

    /// Attach the factory for this kind's default property bag.
    pub fn with_default_properties<F>(mut self, defaults: F) -> Self
    where
        F: Fn() -> Map<String, Value> + Send + Sync + 'static,
    {
        self.default_properties = Some(Arc::new(defaults));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn scope(&self) -> RecordScope {
        self.scope
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    /// A fresh default property bag, empty when no factory is attached.
    pub fn default_properties(&self) -> Map<String, Value> {
        self.default_properties
            .as_ref()
            .map(|defaults| defaults())
            .unwrap_or_default()
    }

    /// Mint a new random id for this kind.
    pub fn create_id(&self) -> RecordId {
        RecordId::new(&self.type_name, &uuid::Uuid::new_v4().simple().to_string())
    }

    /// An id with a caller-chosen suffix, for singleton records.
    pub fn create_custom_id(&self, suffix: &str) -> RecordId {
        RecordId::new(&self.type_name, suffix)
    }

    /// Whether `id` is structurally an id of this kind.
    pub fn is_id(&self, id: &str) -> bool {
        id.strip_prefix(self.type_name.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }

    /// Build a new record from the defaults overlaid with `props`.
    ///
    /// An `id` in `props` is used as-is if it belongs to this kind,
    /// otherwise a fresh one is minted. The record is not validated and not
    /// inserted anywhere.
    pub fn create(&self, props: Map<String, Value>) -> Result<Record> {
        let id = match props.get(ID_KEY) {
            Some(Value::String(id)) if self.is_id(id) => RecordId::from(id.as_str()),
            Some(other) => {
                return Err(StoreError::InvalidRecord(format!(
                    "{other} is not a {} id",
                    self.type_name
                )))
            }
            None => self.create_id(),
        };
        self.create_with_id(id, props)
    }

    /// Build a new record with a given id.
    pub fn create_with_id(&self, id: RecordId, props: Map<String, Value>) -> Result<Record> {
        if !self.is_id(id.as_str()) {
            return Err(StoreError::InvalidRecord(format!(
                "{id} is not a {} id",
                self.type_name
            )));
        }
        let mut fields = self.default_properties();
        fields.extend(props);
        fields.insert(TYPE_NAME_KEY.to_string(), Value::String(self.type_name.clone()));
        fields.insert(ID_KEY.to_string(), Value::String(id.as_str().to_string()));
        Record::from_map(fields)
    }

    pub fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        self.validator.validate(value)
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("current_version", &self.migrations.current_version())
            .finish()
    }
}
