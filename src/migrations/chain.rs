//! Migration chain definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type MigrateFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Default field holding the subtype-specific payload.
pub const DEFAULT_PAYLOAD_KEY: &str = "props";

/// One version step: `up` from `v - 1` to `v`, `down` back again.
///
/// The two functions must be pure. They need not be inverses: a step that
/// drops a field cannot restore it on the way down and substitutes a default
/// instead.
#[derive(Clone)]
pub struct Migration {
    up: MigrateFn,
    down: MigrateFn,
}

impl Migration {
    pub fn new<U, D>(up: U, down: D) -> Self
    where
        U: Fn(Value) -> Value + Send + Sync + 'static,
        D: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            up: Arc::new(up),
            down: Arc::new(down),
        }
    }

    pub fn up(&self, value: Value) -> Value {
        (self.up)(value)
    }

    pub fn down(&self, value: Value) -> Value {
        (self.down)(value)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Migration")
    }
}

/// Independent version chains keyed by a subtype discriminant.
#[derive(Clone, Debug)]
pub struct SubTypeMigrations {
    pub(super) key: String,
    pub(super) payload_key: String,
    pub(super) chains: BTreeMap<String, Migrations>,
}

impl SubTypeMigrations {
    /// Subtype chains selected by the value of `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload_key: DEFAULT_PAYLOAD_KEY.to_string(),
            chains: BTreeMap::new(),
        }
    }

    /// Add the chain for one subtype value.
    pub fn with(mut self, sub_type: impl Into<String>, migrations: Migrations) -> Self {
        self.chains.insert(sub_type.into(), migrations);
        self
    }

    /// Field the subtype chains operate on. Defaults to `props`.
    pub fn with_payload_key(mut self, payload_key: impl Into<String>) -> Self {
        self.payload_key = payload_key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload_key(&self) -> &str {
        &self.payload_key
    }

    pub fn get(&self, sub_type: &str) -> Option<&Migrations> {
        self.chains.get(sub_type)
    }

    /// Current version of each subtype chain.
    pub fn current_versions(&self) -> BTreeMap<String, u32> {
        self.chains
            .iter()
            .map(|(name, chain)| (name.clone(), chain.current_version))
            .collect()
    }
}

/// The migration chain of one record type.
#[derive(Clone, Debug, Default)]
pub struct Migrations {
    pub(super) current_version: u32,
    pub(super) steps: BTreeMap<u32, Migration>,
    pub(super) sub_types: Option<SubTypeMigrations>,
}

impl Migrations {
    /// A chain whose newest version is `current_version`.
    ///
    /// Steps `1..=current_version` are added with [`Migrations::with_step`];
    /// any that are left out surface as gaps when a record needs them.
    pub fn new(current_version: u32) -> Self {
        Self {
            current_version,
            ..Default::default()
        }
    }

    /// A type that has never changed shape.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add the step into `version`.
    pub fn with_step<U, D>(mut self, version: u32, up: U, down: D) -> Self
    where
        U: Fn(Value) -> Value + Send + Sync + 'static,
        D: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.steps.insert(version, Migration::new(up, down));
        self
    }

    /// Layer subtype chains on top of the base chain.
    pub fn with_sub_types(mut self, sub_types: SubTypeMigrations) -> Self {
        self.sub_types = Some(sub_types);
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn step(&self, version: u32) -> Option<&Migration> {
        self.steps.get(&version)
    }

    pub fn sub_types(&self) -> Option<&SubTypeMigrations> {
        self.sub_types.as_ref()
    }

    /// The version a record of this type would carry if written now.
    pub fn current_record_version(&self, record: &Value) -> RecordVersion {
        let sub_type_version = self.sub_types.as_ref().and_then(|subs| {
            record
                .get(&subs.key)
                .and_then(Value::as_str)
                .and_then(|tag| subs.chains.get(tag))
                .map(|chain| chain.current_version)
        });
        RecordVersion {
            root_version: self.current_version,
            sub_type_version,
        }
    }

    /// Current versions in their persisted form.
    pub fn type_versions(&self) -> TypeVersions {
        TypeVersions {
            version: self.current_version,
            sub_type_key: self.sub_types.as_ref().map(|s| s.key.clone()),
            sub_type_versions: self
                .sub_types
                .as_ref()
                .map(SubTypeMigrations::current_versions)
                .unwrap_or_default(),
        }
    }
}

/// Version marker of one stored record.
///
/// A record with no marker is at version 0 with no subtype version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVersion {
    pub root_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type_version: Option<u32>,
}

impl RecordVersion {
    pub fn new(root_version: u32, sub_type_version: Option<u32>) -> Self {
        Self {
            root_version,
            sub_type_version,
        }
    }

    pub fn root(root_version: u32) -> Self {
        Self::new(root_version, None)
    }
}

/// Persisted version info for one record type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeVersions {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_type_versions: BTreeMap<String, u32>,
}

impl TypeVersions {
    /// The marker of a record stored under these versions.
    ///
    /// Subtypes missing from the map were stored at version 0.
    pub fn record_version_of(&self, record: &Value) -> RecordVersion {
        let sub_type_version = self.sub_type_key.as_ref().map(|key| {
            record
                .get(key)
                .and_then(Value::as_str)
                .and_then(|tag| self.sub_type_versions.get(tag).copied())
                .unwrap_or(0)
        });
        RecordVersion {
            root_version: self.version,
            sub_type_version,
        }
    }
}
