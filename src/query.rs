//! Read-side lookups over a store's records.

use crate::store::Store;
use crate::types::{Record, RecordId};
use std::collections::{BTreeMap, BTreeSet};

/// Record ids grouped by type name.
pub(crate) type TypeIndex = BTreeMap<String, BTreeSet<RecordId>>;

pub(crate) fn build_type_index<'a>(ids: impl Iterator<Item = &'a RecordId>) -> TypeIndex {
    let mut index = TypeIndex::new();
    for id in ids {
        index
            .entry(id.prefix().to_string())
            .or_default()
            .insert(id.clone());
    }
    index
}

/// Per-type queries.
///
/// The type index behind these lookups is rebuilt at most once per history
/// change, however many queries run in between.
pub struct StoreQueries<'a> {
    store: &'a Store,
}

impl<'a> StoreQueries<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Ids of every record of `type_name`.
    pub fn ids(&self, type_name: &str) -> BTreeSet<RecordId> {
        self.store
            .type_index()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn records(&self, type_name: &str) -> Vec<Record> {
        self.filter(type_name, |_| true)
    }

    /// Records of `type_name` that satisfy `predicate`, in id order.
    pub fn filter(&self, type_name: &str, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        let index = self.store.type_index();
        let Some(ids) = index.get(type_name) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.store.get(id))
            .filter(|record| predicate(record))
            .collect()
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.store
            .type_index()
            .get(type_name)
            .map_or(0, BTreeSet::len)
    }

    /// Type names with at least one record.
    pub fn type_names(&self) -> Vec<String> {
        self.store.type_index().keys().cloned().collect()
    }
}
