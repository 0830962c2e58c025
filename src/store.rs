//! Main Store struct tying all components together.

use crate::diff::{HistoryAccumulator, HistoryEntry, RecordsDiff};
use crate::error::{MigrationError, Result, StoreError, ValidationFailure, ValidationPhase};
use crate::query::{build_type_index, StoreQueries, TypeIndex};
use crate::schema::Schema;
use crate::signal::{Atom, Computed, FlushScheduler, TickScheduler};
use crate::snapshot::StoreSnapshot;
use crate::subscriptions::{
    ListenerFilter, ListenerId, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, DEFAULT_BUFFER_SIZE,
};
use crate::types::{ChangeSource, Record, RecordId, RecordScope};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Snapshot to load on construction.
    pub initial_data: Option<StoreSnapshot>,

    /// Opaque caller-owned properties, readable through [`Store::props`].
    pub props: Value,

    /// Buffer size for [`Store::subscribe_all`].
    /// Default: 1000
    pub subscription_buffer_size: usize,

    /// Decides when pending history is flushed to listeners.
    ///
    /// With `None` the store owns a [`TickScheduler`] and pending history
    /// is delivered by [`Store::tick`]. Pass
    /// [`ImmediateScheduler`](crate::signal::ImmediateScheduler) to flush
    /// after every mutation instead.
    /// Default: None
    pub scheduler: Option<Arc<dyn FlushScheduler>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_data: None,
            props: Value::Null,
            subscription_buffer_size: DEFAULT_BUFFER_SIZE,
            scheduler: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("initial_records", &self.initial_data.as_ref().map(StoreSnapshot::len))
            .field("props", &self.props)
            .field("subscription_buffer_size", &self.subscription_buffer_size)
            .field("external_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// A persisted record that did not load cleanly.
#[derive(Debug)]
pub enum LoadIssue {
    /// Migration failed; the record was skipped.
    Migration { id: RecordId, error: MigrationError },

    /// The record failed validation but was loaded as-is.
    Validation {
        id: RecordId,
        failure: Box<ValidationFailure>,
    },

    /// The record could not be read at all; it was skipped.
    Rejected { id: RecordId, error: StoreError },
}

impl LoadIssue {
    pub fn id(&self) -> &RecordId {
        match self {
            LoadIssue::Migration { id, .. }
            | LoadIssue::Validation { id, .. }
            | LoadIssue::Rejected { id, .. } => id,
        }
    }

    /// Whether the record is present in the store despite the issue.
    pub fn loaded(&self) -> bool {
        matches!(self, LoadIssue::Validation { .. })
    }
}

/// Pending history plus the observers it is flushed to.
///
/// Flush tasks hold only a weak reference, so a queued task outliving its
/// store does nothing.
struct HistoryHub {
    schema: Arc<Schema>,
    accumulator: HistoryAccumulator,
    subscriptions: SubscriptionManager,
    scheduler: Arc<dyn FlushScheduler>,
    flush_scheduled: AtomicBool,
    flushing: AtomicBool,
}

/// Clears the flushing flag even if a listener panics.
struct FlushingGuard<'a>(&'a AtomicBool);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HistoryHub {
    fn record(self: &Arc<Self>, entry: HistoryEntry) {
        self.accumulator.add(entry);
        self.schedule_flush();
    }

    /// Request a flush. Requests coalesce until the scheduled task runs,
    /// so at most one task per hub is ever queued.
    fn schedule_flush(self: &Arc<Self>) {
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hub = Arc::downgrade(self);
        self.scheduler.schedule(Box::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.flush_scheduled.store(false, Ordering::SeqCst);
                hub.flush();
            }
        }));
    }

    /// Drain pending history once and notify observers. Returns the number
    /// of entries delivered.
    ///
    /// Changes made by a listener start a fresh batch, which is handed back
    /// to the scheduler once this delivery is done. A flush requested while
    /// one is running returns 0 and delivers nothing; the outer flush
    /// reschedules whatever is pending.
    fn flush(self: &Arc<Self>) -> usize {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let delivered = {
            let _guard = FlushingGuard(&self.flushing);
            let entries = self.accumulator.flush();
            if !entries.is_empty() {
                debug!(entries = entries.len(), "flushing history");
                let scope_of = |type_name: &str| self.schema.scope_of(type_name);
                for entry in &entries {
                    self.subscriptions.dispatch(entry, &scope_of);
                }
            }
            entries.len()
        };

        if self.accumulator.has_changes() {
            self.schedule_flush();
        }
        delivered
    }
}

/// Validated, staged change to one record.
struct Staged {
    before: Option<Record>,
    after: Option<Record>,
}

/// The reactive record store.
///
/// Provides a unified interface for:
/// - Validated, atomic mutation batches
/// - Reading records and per-type queries
/// - Batched change notification through listeners and channels
/// - Snapshot export and import with migration
pub struct Store {
    schema: Arc<Schema>,
    props: Value,

    /// One cell per record.
    records: RwLock<BTreeMap<RecordId, Atom<Record>>>,

    /// Advances once per committed batch.
    history: Atom<u64>,

    hub: Arc<HistoryHub>,

    /// Set when the store drives its own flushes through [`Store::tick`].
    ticker: Option<Arc<TickScheduler>>,

    /// Records grouped by type, rebuilt lazily after history advances.
    type_index: Computed<Arc<TypeIndex>>,

    load_issues: Vec<LoadIssue>,

    subscription_buffer_size: usize,

    /// Lock for write operations to ensure atomicity.
    write_lock: Mutex<()>,
}

impl Store {
    /// Create a store, loading `config.initial_data` if given.
    ///
    /// Each persisted record is migrated to the current schema and then
    /// validated. A record that fails to migrate is skipped. A record that
    /// migrates but fails validation is loaded anyway. Both cases are
    /// logged and listed in [`Store::load_issues`].
    pub fn new(schema: Arc<Schema>, config: StoreConfig) -> Result<Self> {
        let StoreConfig {
            initial_data,
            props,
            subscription_buffer_size,
            scheduler,
        } = config;

        let mut cells = BTreeMap::new();
        let mut load_issues = Vec::new();
        if let Some(snapshot) = initial_data {
            for (id, value) in snapshot.records {
                match Self::load_record(&schema, &snapshot.schema, &id, value) {
                    Ok((record, issue)) => {
                        cells.insert(record.id().clone(), Atom::new(record));
                        load_issues.extend(issue);
                    }
                    Err(issue) => load_issues.push(issue),
                }
            }
            debug!(
                records = cells.len(),
                issues = load_issues.len(),
                "loaded initial data"
            );
        }

        let (scheduler, ticker) = match scheduler {
            Some(scheduler) => (scheduler, None),
            None => {
                let ticker = Arc::new(TickScheduler::new());
                let scheduler: Arc<dyn FlushScheduler> = ticker.clone();
                (scheduler, Some(ticker))
            }
        };

        let hub = Arc::new(HistoryHub {
            schema: Arc::clone(&schema),
            accumulator: HistoryAccumulator::new(),
            subscriptions: SubscriptionManager::new(),
            scheduler,
            flush_scheduled: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
        });

        Ok(Self {
            schema,
            props,
            records: RwLock::new(cells),
            history: Atom::new(0),
            hub,
            ticker,
            type_index: Computed::new(),
            load_issues,
            subscription_buffer_size,
            write_lock: Mutex::new(()),
        })
    }

    /// Migrate and validate one persisted record.
    fn load_record(
        schema: &Schema,
        persisted: &crate::schema::SerializedSchema,
        id: &RecordId,
        value: Value,
    ) -> std::result::Result<(Record, Option<LoadIssue>), LoadIssue> {
        let version = persisted.record_version_of(&value);
        let migrated = schema
            .migrate_persisted_record(value, version)
            .map_err(|error| {
                warn!(%id, %error, "skipping record that failed to migrate");
                LoadIssue::Migration {
                    id: id.clone(),
                    error,
                }
            })?;

        let rejected = |error: StoreError| {
            warn!(%id, %error, "skipping unreadable record");
            LoadIssue::Rejected {
                id: id.clone(),
                error,
            }
        };

        let (record, issue) = match schema.validate_record(&migrated, ValidationPhase::Initialize, None) {
            Ok(record) => (record, None),
            Err(StoreError::Validation(failure)) => {
                let record = Record::from_value(migrated).map_err(rejected)?;
                warn!(%id, error = %failure.error, "loading record with existing validation issue");
                let issue = LoadIssue::Validation {
                    id: id.clone(),
                    failure,
                };
                (record, Some(issue))
            }
            Err(error) => return Err(rejected(error)),
        };

        if record.id() != id {
            return Err(rejected(StoreError::InvalidRecord(format!(
                "stored under {id} but has id {}",
                record.id()
            ))));
        }
        Ok((record, issue))
    }

    // --- Reading ---

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.records.read().get(id).map(Atom::get)
    }

    pub fn has(&self, id: &RecordId) -> bool {
        self.records.read().contains_key(id)
    }

    /// Every record, in id order.
    pub fn all_records(&self) -> Vec<Record> {
        self.records.read().values().map(Atom::get).collect()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of writes to one record's cell since it was created.
    pub fn record_epoch(&self, id: &RecordId) -> Option<u64> {
        self.records.read().get(id).map(Atom::epoch)
    }

    /// Number of committed batches.
    pub fn history(&self) -> u64 {
        self.history.get()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn props(&self) -> &Value {
        &self.props
    }

    /// Problems found while loading the initial data.
    pub fn load_issues(&self) -> &[LoadIssue] {
        &self.load_issues
    }

    pub fn query(&self) -> StoreQueries<'_> {
        StoreQueries::new(self)
    }

    pub(crate) fn type_index(&self) -> Arc<TypeIndex> {
        self.type_index.get(self.history.epoch(), || {
            Arc::new(build_type_index(self.records.read().keys()))
        })
    }

    // --- Mutation ---

    /// Insert or replace records as one batch.
    ///
    /// Every record is validated before anything is written; if any fails
    /// the store is unchanged. Records equal to the stored value are
    /// skipped. Returns the net diff, which is empty if nothing changed.
    pub fn put(&self, records: impl IntoIterator<Item = Record>, source: ChangeSource) -> Result<RecordsDiff> {
        self.apply_batch(records.into_iter().collect(), Vec::new(), source)
    }

    /// Delete records as one batch. Unknown ids are ignored.
    pub fn remove<'a>(&self, ids: impl IntoIterator<Item = &'a RecordId>, source: ChangeSource) -> RecordsDiff {
        let diff = {
            let _lock = self.write_lock.lock();
            let staged = {
                let cells = self.records.read();
                let mut staged = BTreeMap::new();
                Self::stage_removes(&cells, &mut staged, ids.into_iter().cloned());
                staged
            };
            self.commit_staged(staged)
        };
        self.record_batch(diff, source)
    }

    /// Replace one record with `updater`'s result.
    pub fn update<F>(&self, id: &RecordId, updater: F, source: ChangeSource) -> Result<RecordsDiff>
    where
        F: FnOnce(&Record) -> Result<Record>,
    {
        let current = self
            .get(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.clone()))?;
        let next = updater(&current)?;
        if next.id() != id {
            return Err(StoreError::InvalidOperation(format!(
                "updater for {id} returned record {}",
                next.id()
            )));
        }
        self.put([next], source)
    }

    /// Remove every record.
    pub fn clear(&self, source: ChangeSource) -> RecordsDiff {
        let ids = self.ids();
        self.remove(&ids, source)
    }

    /// Apply a diff as one batch: its adds and updates are put, its
    /// removals removed. Applying `diff.reversed()` undoes `diff`.
    pub fn apply_diff(&self, diff: &RecordsDiff, source: ChangeSource) -> Result<RecordsDiff> {
        let puts = diff
            .added
            .values()
            .chain(diff.updated.values().map(|(_, to)| to))
            .cloned()
            .collect();
        let removes = diff.removed.keys().cloned().collect();
        self.apply_batch(puts, removes, source)
    }

    /// Run `f` and return the net diff of every change it made.
    ///
    /// The changes are recorded in history and flushed as usual.
    pub fn extracting_changes<R>(&self, f: impl FnOnce() -> R) -> (R, RecordsDiff) {
        let collected = Arc::new(Mutex::new(RecordsDiff::new()));
        let guard = {
            let collected = Arc::clone(&collected);
            self.hub
                .accumulator
                .intercepting(move |entry| collected.lock().squash(&entry.changes))
        };
        let result = f();
        drop(guard);
        let changes = std::mem::take(&mut *collected.lock());
        (result, changes)
    }

    fn apply_batch(&self, puts: Vec<Record>, removes: Vec<RecordId>, source: ChangeSource) -> Result<RecordsDiff> {
        let diff = {
            let _lock = self.write_lock.lock();
            let staged = {
                let cells = self.records.read();
                let mut staged = self.stage_puts(&cells, puts)?;
                Self::stage_removes(&cells, &mut staged, removes);
                staged
            };
            self.commit_staged(staged)
        };
        Ok(self.record_batch(diff, source))
    }

    /// Write the net change of `staged`, if any. Callers hold `write_lock`.
    fn commit_staged(&self, staged: BTreeMap<RecordId, Staged>) -> RecordsDiff {
        let diff = Self::diff_of(staged);
        if !diff.is_empty() {
            self.commit(&diff);
        }
        diff
    }

    /// Append a committed batch to history. Runs after `write_lock` is
    /// released, so listeners called from here may mutate.
    fn record_batch(&self, diff: RecordsDiff, source: ChangeSource) -> RecordsDiff {
        if diff.is_empty() {
            return diff;
        }
        debug!(
            %source,
            added = diff.added.len(),
            updated = diff.updated.len(),
            removed = diff.removed.len(),
            "committed batch"
        );
        self.hub.record(HistoryEntry::new(diff.clone(), source));
        diff
    }

    /// Validate every put against the current state without writing.
    fn stage_puts(
        &self,
        cells: &BTreeMap<RecordId, Atom<Record>>,
        puts: Vec<Record>,
    ) -> Result<BTreeMap<RecordId, Staged>> {
        let mut staged: BTreeMap<RecordId, Staged> = BTreeMap::new();

        for record in puts {
            let id = record.id().clone();
            let before = match staged.get(&id) {
                Some(entry) => entry.before.clone(),
                None => cells.get(&id).map(Atom::get),
            };
            // Ids carry their type as prefix, so a put can never change a
            // record's type; a different type means a different id.
            let phase = if before.is_some() {
                ValidationPhase::UpdateRecord
            } else {
                ValidationPhase::CreateRecord
            };
            let validated = self
                .schema
                .validate_record(&record.to_value(), phase, before.as_ref())?;
            staged.insert(
                id,
                Staged {
                    before,
                    after: Some(validated),
                },
            );
        }
        Ok(staged)
    }

    /// Stage removals on top of `staged`. Ids that exist nowhere are skipped.
    fn stage_removes(
        cells: &BTreeMap<RecordId, Atom<Record>>,
        staged: &mut BTreeMap<RecordId, Staged>,
        removes: impl IntoIterator<Item = RecordId>,
    ) {
        for id in removes {
            match staged.get_mut(&id) {
                Some(entry) => entry.after = None,
                None => {
                    if let Some(cell) = cells.get(&id) {
                        staged.insert(
                            id,
                            Staged {
                                before: Some(cell.get()),
                                after: None,
                            },
                        );
                    }
                }
            }
        }
    }

    fn diff_of(staged: BTreeMap<RecordId, Staged>) -> RecordsDiff {
        let mut diff = RecordsDiff::new();
        for (_, change) in staged {
            match (change.before, change.after) {
                (None, Some(after)) => diff.push_add(after),
                (Some(before), Some(after)) if before != after => diff.push_update(before, after),
                (Some(before), None) => diff.push_remove(before),
                _ => {}
            }
        }
        diff
    }

    fn commit(&self, diff: &RecordsDiff) {
        let mut cells = self.records.write();
        for id in diff.removed.keys() {
            cells.remove(id);
        }
        for (id, (_, to)) in &diff.updated {
            match cells.get(id) {
                Some(cell) => {
                    cell.set(to.clone());
                }
                None => {
                    cells.insert(id.clone(), Atom::new(to.clone()));
                }
            }
        }
        for (id, record) in &diff.added {
            cells.insert(id.clone(), Atom::new(record.clone()));
        }
        self.history.update(|n| *n += 1);
    }

    // --- Notification ---

    /// Call `listener` with every flushed history entry.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HistoryEntry) + Send + Sync + 'static,
    {
        self.add_listener_with(listener, ListenerFilter::all())
    }

    /// Call `listener` with the part of each flushed entry `filter` lets through.
    pub fn add_listener_with<F>(&self, listener: F, filter: ListenerFilter) -> ListenerId
    where
        F: Fn(&HistoryEntry) + Send + Sync + 'static,
    {
        self.hub.subscriptions.add_listener(filter, Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.hub.subscriptions.remove_listener(id)
    }

    /// Receive flushed history through a bounded channel.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.hub.subscriptions.subscribe(config)
    }

    /// Subscribe to everything with the configured buffer size.
    pub fn subscribe_all(&self) -> SubscriptionHandle {
        self.subscribe(SubscriptionConfig {
            buffer_size: self.subscription_buffer_size,
            filter: ListenerFilter::all(),
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.subscriptions.unsubscribe(id)
    }

    /// Deliver pending history now instead of waiting for the scheduler.
    ///
    /// Returns the number of entries delivered. Changes listeners make
    /// during this delivery wait for the next tick or flush.
    pub fn flush(&self) -> usize {
        self.hub.flush()
    }

    /// Run the flushes the store's own scheduler has queued, delivering at
    /// most one batch. Returns the number of flushes run; always 0 when
    /// [`StoreConfig::scheduler`] was given.
    pub fn tick(&self) -> usize {
        self.ticker.as_ref().map_or(0, |ticker| ticker.tick())
    }

    /// Whether there is history not yet flushed.
    pub fn has_pending_changes(&self) -> bool {
        self.hub.accumulator.has_changes()
    }

    // --- Snapshots ---

    /// Records of `scope` (all records if None) with the current schema versions.
    pub fn serialize(&self, scope: Option<RecordScope>) -> StoreSnapshot {
        let records = self
            .records
            .read()
            .iter()
            .map(|(id, cell)| (id, cell.get()))
            .filter(|(_, record)| scope.is_none() || self.schema.scope_of(record.type_name()) == scope)
            .map(|(id, record)| (id.clone(), record.to_value()))
            .collect();
        StoreSnapshot::new(self.schema.serialize(), records)
    }

    /// The persistable part of the store: document-scoped records.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.serialize(Some(RecordScope::Document))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.len())
            .field("history", &self.history())
            .field("listeners", &self.hub.subscriptions.listener_count())
            .field("subscriptions", &self.hub.subscriptions.subscription_count())
            .finish()
    }
}
