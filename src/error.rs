//! Error types for the record store.

use crate::types::RecordId;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(Box<ValidationFailure>),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Record type registered twice: {0}")]
    DuplicateRecordType(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl StoreError {
    /// The validation failure carried by this error, if any.
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            StoreError::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for StoreError {
    fn from(failure: ValidationFailure) -> Self {
        StoreError::Validation(Box::new(failure))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One step in the path to a failing value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A value failed a validator.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    /// Where in the input the failure happened, outermost first.
    pub path: Vec<PathSegment>,
    /// Expected-vs-actual description.
    pub message: String,
    /// Name of the innermost model the failure happened under.
    pub model: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
            model: None,
        }
    }

    /// Prefix the path with an object key.
    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.insert(0, PathSegment::Key(key.into()));
        self
    }

    /// Prefix the path with an array index.
    pub fn at_index(mut self, index: usize) -> Self {
        self.path.insert(0, PathSegment::Index(index));
        self
    }

    /// Annotate with a model name unless a nested model already did.
    pub fn in_model(mut self, name: &str) -> Self {
        if self.model.is_none() {
            self.model = Some(name.to_string());
        }
        self
    }

    /// The path rendered as `props.items[2].name`.
    pub fn path_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(index) => {
                    out.push_str(&format!("[{index}]"));
                }
            }
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path_string();
        match (&self.model, path.is_empty()) {
            (Some(model), true) => write!(f, "At {model}: {}", self.message),
            (Some(model), false) => write!(f, "At {model}.{path}: {}", self.message),
            (None, true) => f.write_str(&self.message),
            (None, false) => write!(f, "{path}: {}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// When a record was validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationPhase {
    Initialize,
    CreateRecord,
    UpdateRecord,
    Tests,
}

impl fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationPhase::Initialize => "initialize",
            ValidationPhase::CreateRecord => "createRecord",
            ValidationPhase::UpdateRecord => "updateRecord",
            ValidationPhase::Tests => "tests",
        };
        f.write_str(name)
    }
}

/// A record failed its type's validator.
#[derive(Clone, Debug, Error)]
#[error("{phase} validation failed: {error}")]
pub struct ValidationFailure {
    #[source]
    pub error: ValidationError,
    pub phase: ValidationPhase,
    pub record_before: Option<Value>,
    pub record_after: Value,
    /// True when the record was already-invalid persisted data being loaded,
    /// false when it is new input.
    pub is_existing_validation_issue: bool,
}

/// Direction of a migration step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => f.write_str("up"),
            MigrationDirection::Down => f.write_str("down"),
        }
    }
}

/// A record could not be moved between versions.
///
/// `chain` names the version chain involved: the type name for the base
/// chain, `type:subtype` for a subtype chain.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Migration gap in {chain} for {id}: no {direction} step for version {missing} ({from} -> {to})")]
    Gap {
        id: String,
        chain: String,
        direction: MigrationDirection,
        missing: u32,
        from: u32,
        to: u32,
    },

    #[error("Record {id} in {chain} has version {stored}, newer than known version {current}")]
    FutureVersion {
        id: String,
        chain: String,
        stored: u32,
        current: u32,
    },

    #[error("Record {id} of type {type_name} has unknown subtype {sub_type:?}")]
    UnknownSubType {
        id: String,
        type_name: String,
        sub_type: String,
    },

    #[error("Record {id} of type {type_name} is missing subtype key {key:?}")]
    MissingSubTypeKey {
        id: String,
        type_name: String,
        key: String,
    },

    #[error("Record {id} of type {type_name} has no object payload under {key:?}")]
    InvalidPayload {
        id: String,
        type_name: String,
        key: String,
    },

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),
}
