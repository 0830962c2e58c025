//! The added/updated/removed diff and its merge rules.

use crate::types::{Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net effect of a span of mutations.
///
/// Each id appears in at most one of the three maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsDiff {
    pub added: BTreeMap<RecordId, Record>,
    /// `(from, to)` pairs.
    pub updated: BTreeMap<RecordId, (Record, Record)>,
    pub removed: BTreeMap<RecordId, Record>,
}

impl RecordsDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Number of distinct ids touched.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn touched_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.added
            .keys()
            .chain(self.updated.keys())
            .chain(self.removed.keys())
    }

    /// Fold in an add.
    ///
    /// Re-adding a record removed earlier in the span cancels out if the
    /// value is unchanged and becomes an update otherwise.
    pub fn push_add(&mut self, record: Record) {
        let id = record.id().clone();
        match self.removed.remove(&id) {
            Some(previous) if previous == record => {}
            Some(previous) => {
                self.updated.insert(id, (previous, record));
            }
            None => {
                self.added.insert(id, record);
            }
        }
    }

    /// Fold in an update.
    ///
    /// A record added earlier in the span stays an add with the newest
    /// value; a record already updated keeps its original `from`.
    pub fn push_update(&mut self, from: Record, to: Record) {
        let id = to.id().clone();
        if let Some(added) = self.added.get_mut(&id) {
            *added = to;
            return;
        }
        if let Some(entry) = self.updated.get_mut(&id) {
            entry.1 = to;
            return;
        }
        self.removed.remove(&id);
        self.updated.insert(id, (from, to));
    }

    /// Fold in a removal.
    ///
    /// Removing a record added earlier in the span nets to nothing; removing
    /// one updated earlier records its value from before the span.
    pub fn push_remove(&mut self, record: Record) {
        let id = record.id().clone();
        if self.added.remove(&id).is_some() {
            return;
        }
        if let Some((from, _)) = self.updated.remove(&id) {
            self.removed.insert(id, from);
            return;
        }
        self.removed.insert(id, record);
    }

    /// Fold a later diff into this one.
    pub fn squash(&mut self, later: &RecordsDiff) {
        for record in later.added.values() {
            self.push_add(record.clone());
        }
        for (from, to) in later.updated.values() {
            self.push_update(from.clone(), to.clone());
        }
        for record in later.removed.values() {
            self.push_remove(record.clone());
        }
    }

    /// The diff that undoes this one.
    pub fn reversed(&self) -> RecordsDiff {
        RecordsDiff {
            added: self.removed.clone(),
            updated: self
                .updated
                .iter()
                .map(|(id, (from, to))| (id.clone(), (to.clone(), from.clone())))
                .collect(),
            removed: self.added.clone(),
        }
    }

    /// Only the entries whose record satisfies `keep`.
    ///
    /// Updates are judged by their `to` value.
    pub fn filter(&self, keep: impl Fn(&Record) -> bool) -> RecordsDiff {
        RecordsDiff {
            added: self
                .added
                .iter()
                .filter(|(_, r)| keep(r))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
            updated: self
                .updated
                .iter()
                .filter(|(_, (_, to))| keep(to))
                .map(|(id, pair)| (id.clone(), pair.clone()))
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|(_, r)| keep(r))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }
}

/// Squash a sequence of diffs, in order, into one.
pub fn squash_record_diffs<'a, I>(diffs: I) -> RecordsDiff
where
    I: IntoIterator<Item = &'a RecordsDiff>,
{
    let mut result = RecordsDiff::new();
    for diff in diffs {
        result.squash(diff);
    }
    result
}

/// Swap added and removed and flip every update.
pub fn reverse_records_diff(diff: &RecordsDiff) -> RecordsDiff {
    diff.reversed()
}

/// Apply a diff to a plain record map.
pub fn apply_records_diff(records: &mut BTreeMap<RecordId, Record>, diff: &RecordsDiff) {
    for id in diff.removed.keys() {
        records.remove(id);
    }
    for (id, (_, to)) in &diff.updated {
        records.insert(id.clone(), to.clone());
    }
    for (id, record) in &diff.added {
        records.insert(id.clone(), record.clone());
    }
}
