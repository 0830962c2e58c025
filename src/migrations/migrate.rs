//! Moving records between versions.

use super::chain::{Migrations, RecordVersion, SubTypeMigrations};
use crate::error::{MigrationDirection, MigrationError};
use crate::types::ID_KEY;
use serde_json::Value;
use tracing::trace;

impl Migrations {
    /// Bring a stored record up to the current version.
    pub fn migrate_to_current(
        &self,
        type_name: &str,
        record: Value,
        from: RecordVersion,
    ) -> Result<Value, MigrationError> {
        self.migrate(type_name, record, from, RecordVersion::root(self.current_version))
    }

    /// Move a record from one version to another, up or down.
    ///
    /// Going up, the base chain runs first and the subtype chain second (the
    /// subtype is read after the base chain, which may rewrite it). Going
    /// down the order is reversed. A missing `from.sub_type_version` means
    /// version 0; a missing `to.sub_type_version` means the subtype chain's
    /// current version.
    pub fn migrate(
        &self,
        type_name: &str,
        record: Value,
        from: RecordVersion,
        to: RecordVersion,
    ) -> Result<Value, MigrationError> {
        let id = record_id(&record);
        if to.root_version >= from.root_version {
            let record = run_chain(
                self,
                type_name,
                &id,
                record,
                from.root_version,
                to.root_version,
            )?;
            match &self.sub_types {
                Some(subs) => run_sub_type_chain(
                    subs,
                    type_name,
                    record,
                    from.sub_type_version,
                    to.sub_type_version,
                ),
                None => Ok(record),
            }
        } else {
            let record = match &self.sub_types {
                Some(subs) => run_sub_type_chain(
                    subs,
                    type_name,
                    record,
                    from.sub_type_version,
                    to.sub_type_version,
                )?,
                None => record,
            };
            run_chain(
                self,
                type_name,
                &id,
                record,
                from.root_version,
                to.root_version,
            )
        }
    }
}

fn record_id(record: &Value) -> String {
    record
        .get(ID_KEY)
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}

/// Fail unless every step between `from` and `to` exists and both ends are known.
fn check_range(
    chain: &Migrations,
    label: &str,
    id: &str,
    from: u32,
    to: u32,
) -> Result<(), MigrationError> {
    for version in [from, to] {
        if version > chain.current_version {
            return Err(MigrationError::FutureVersion {
                id: id.to_string(),
                chain: label.to_string(),
                stored: version,
                current: chain.current_version,
            });
        }
    }

    let (direction, range) = if from <= to {
        (MigrationDirection::Up, (from + 1)..=to)
    } else {
        (MigrationDirection::Down, (to + 1)..=from)
    };
    if let Some(missing) = range.into_iter().find(|v| !chain.steps.contains_key(v)) {
        return Err(MigrationError::Gap {
            id: id.to_string(),
            chain: label.to_string(),
            direction,
            missing,
            from,
            to,
        });
    }
    Ok(())
}

fn run_chain(
    chain: &Migrations,
    label: &str,
    id: &str,
    mut value: Value,
    from: u32,
    to: u32,
) -> Result<Value, MigrationError> {
    check_range(chain, label, id, from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            if let Some(step) = chain.steps.get(&version) {
                trace!(%id, chain = label, version, "migrating up");
                value = step.up(value);
            }
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            if let Some(step) = chain.steps.get(&version) {
                trace!(%id, chain = label, version, "migrating down");
                value = step.down(value);
            }
        }
    }
    Ok(value)
}

fn run_sub_type_chain(
    subs: &SubTypeMigrations,
    type_name: &str,
    record: Value,
    from: Option<u32>,
    to: Option<u32>,
) -> Result<Value, MigrationError> {
    let id = record_id(&record);
    let tag = record
        .get(&subs.key)
        .and_then(Value::as_str)
        .ok_or_else(|| MigrationError::MissingSubTypeKey {
            id: id.clone(),
            type_name: type_name.to_string(),
            key: subs.key.clone(),
        })?
        .to_string();
    let chain = subs
        .chains
        .get(&tag)
        .ok_or_else(|| MigrationError::UnknownSubType {
            id: id.clone(),
            type_name: type_name.to_string(),
            sub_type: tag.clone(),
        })?;

    let label = format!("{type_name}:{tag}");
    let from = from.unwrap_or(0);
    let to = to.unwrap_or(chain.current_version);
    check_range(chain, &label, &id, from, to)?;
    if from == to {
        return Ok(record);
    }

    let invalid_payload = || MigrationError::InvalidPayload {
        id: id.clone(),
        type_name: type_name.to_string(),
        key: subs.payload_key.clone(),
    };
    let Value::Object(mut fields) = record else {
        return Err(invalid_payload());
    };
    let payload = fields
        .remove(&subs.payload_key)
        .filter(Value::is_object)
        .ok_or_else(invalid_payload)?;

    let payload = run_chain(chain, &label, &id, payload, from, to)?;
    fields.insert(subs.payload_key.clone(), payload);
    Ok(Value::Object(fields))
}
