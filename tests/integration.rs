//! Integration tests for the record store.

mod common;

use common::{camera, counter, put_user, record_history, store, store_with, tick_store};
use parking_lot::Mutex;
use record_store::{
    ChangeSource, HistoryEntry, ListenerFilter, RecordId, RecordScope, Store, StoreConfig,
    StoreEvent, StoreSnapshot, SubscriptionConfig,
};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;

fn id(s: &str) -> RecordId {
    RecordId::from(s)
}

// --- Batched Notification ---

#[test]
fn test_counter_add_and_update_before_flush_is_one_net_add() {
    let (store, scheduler) = tick_store();
    let seen = record_history(&store);

    put_user(&store, [counter("counter:1", 1)]);
    put_user(&store, [counter("counter:1", 2)]);
    assert!(seen.lock().is_empty());

    scheduler.tick();
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].source, ChangeSource::User);
    assert!(seen[0].changes.updated.is_empty());
    assert_eq!(seen[0].changes.added[&id("counter:1")], counter("counter:1", 2));
}

#[test]
fn test_counter_updates_between_flushes() {
    let (store, scheduler) = tick_store();
    let seen = record_history(&store);

    put_user(&store, [counter("counter:1", 1)]);
    scheduler.tick();

    put_user(&store, [counter("counter:1", 2)]);
    put_user(&store, [counter("counter:1", 3)]);
    scheduler.tick();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[1].changes.updated[&id("counter:1")],
        (counter("counter:1", 1), counter("counter:1", 3))
    );
}

#[test]
fn test_sources_are_never_squashed_together() {
    let (store, scheduler) = tick_store();
    let seen = record_history(&store);

    put_user(&store, [counter("counter:1", 1)]);
    put_user(&store, [counter("counter:1", 2)]);
    store.put([counter("counter:2", 1)], ChangeSource::Remote).unwrap();
    put_user(&store, [counter("counter:1", 3)]);

    assert_eq!(scheduler.tick(), 1);
    let sources: Vec<ChangeSource> = seen.lock().iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        vec![ChangeSource::User, ChangeSource::Remote, ChangeSource::User]
    );
}

#[test]
fn test_one_flush_per_tick() {
    let (store, scheduler) = tick_store();
    for i in 0..50 {
        put_user(&store, [counter("counter:1", i)]);
    }
    assert_eq!(scheduler.pending(), 1);
    assert!(store.has_pending_changes());

    scheduler.tick();
    assert!(!store.has_pending_changes());
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_explicit_flush_and_stale_task() {
    let (store, scheduler) = tick_store();
    let seen = record_history(&store);

    put_user(&store, [counter("counter:1", 1)]);
    assert_eq!(store.flush(), 1);
    assert_eq!(seen.lock().len(), 1);

    // The queued task finds nothing left to deliver.
    scheduler.tick();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_default_store_waits_for_tick() {
    let store = store();
    let seen = record_history(&store);

    put_user(&store, [counter("counter:1", 1)]);
    put_user(&store, [counter("counter:1", 2)]);
    assert!(seen.lock().is_empty());

    assert_eq!(store.tick(), 1);
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].changes.added[&id("counter:1")], counter("counter:1", 2));
}

#[test]
fn test_listener_mutation_starts_new_batch() {
    let store = Arc::new(store());
    let seen = record_history(&store);

    let weak: Weak<Store> = Arc::downgrade(&store);
    store.add_listener(move |entry: &HistoryEntry| {
        if entry.source != ChangeSource::Remote {
            return;
        }
        if let Some(store) = weak.upgrade() {
            let total = entry.changes.added.len() as i64;
            store
                .put([counter("counter:mirror", total)], ChangeSource::User)
                .unwrap();
        }
    });

    store
        .put([counter("counter:1", 1), counter("counter:2", 2)], ChangeSource::Remote)
        .unwrap();

    // The mirror write is held for the next tick.
    assert_eq!(store.tick(), 1);
    assert_eq!(seen.lock().len(), 1);
    assert!(store.has(&id("counter:mirror")));
    assert!(store.has_pending_changes());

    assert_eq!(store.tick(), 1);
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].source, ChangeSource::Remote);
    assert_eq!(seen[0].changes.len(), 2);
    assert_eq!(seen[1].source, ChangeSource::User);
    assert_eq!(seen[1].changes.added[&id("counter:mirror")], counter("counter:mirror", 2));
}

#[test]
fn test_listener_writes_are_delivered_one_batch_per_tick() {
    let (store, scheduler) = tick_store();
    let store = Arc::new(store);
    let seen = record_history(&store);

    let weak = Arc::downgrade(&store);
    let echoes = Arc::new(Mutex::new(0i64));
    {
        let echoes = Arc::clone(&echoes);
        store.add_listener(move |_| {
            let mut echoes = echoes.lock();
            if *echoes >= 5 {
                return;
            }
            *echoes += 1;
            if let Some(store) = weak.upgrade() {
                store
                    .put([counter("counter:echo", *echoes)], ChangeSource::Remote)
                    .unwrap();
            }
        });
    }

    put_user(&store, [counter("counter:1", 1)]);
    for delivered in 1..=6 {
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(seen.lock().len(), delivered);
    }
    assert_eq!(scheduler.tick(), 0);
    assert!(!store.has_pending_changes());

    let seen = seen.lock();
    assert_eq!(seen[0].source, ChangeSource::User);
    assert!(seen[1..].iter().all(|entry| entry.source == ChangeSource::Remote));
    assert_eq!(store.get(&id("counter:echo")), Some(counter("counter:echo", 5)));
}

#[test]
fn test_explicit_flush_leaves_listener_writes_for_later() {
    let (store, scheduler) = tick_store();
    let store = Arc::new(store);
    let seen = record_history(&store);

    let weak = Arc::downgrade(&store);
    store.add_listener(move |entry| {
        if entry.source == ChangeSource::User {
            if let Some(store) = weak.upgrade() {
                store.put([counter("counter:echo", 0)], ChangeSource::Remote).unwrap();
            }
        }
    });

    put_user(&store, [counter("counter:1", 1)]);
    assert_eq!(store.flush(), 1);
    assert_eq!(seen.lock().len(), 1);
    assert!(store.has_pending_changes());

    // The write joins the task already queued instead of adding another.
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(scheduler.tick(), 1);
    assert_eq!(seen.lock().len(), 2);
    assert_eq!(seen.lock()[1].source, ChangeSource::Remote);
}

#[test]
fn test_listener_removed_during_flush_does_not_disturb_others() {
    let store = Arc::new(store());
    let seen = record_history(&store);
    let own_id = Arc::new(Mutex::new(None));

    let weak = Arc::downgrade(&store);
    let slot = Arc::clone(&own_id);
    let listener = store.add_listener(move |_| {
        if let (Some(store), Some(id)) = (weak.upgrade(), *slot.lock()) {
            store.remove_listener(id);
        }
    });
    *own_id.lock() = Some(listener);

    put_user(&store, [counter("counter:1", 1)]);
    store.tick();
    put_user(&store, [counter("counter:1", 2)]);
    store.tick();

    assert_eq!(seen.lock().len(), 2);
    assert!(!store.remove_listener(listener));
}

#[test]
fn test_filtered_listeners() {
    let store = store();
    let documents = Arc::new(Mutex::new(Vec::new()));
    let remote = Arc::new(Mutex::new(Vec::new()));
    {
        let documents = Arc::clone(&documents);
        store.add_listener_with(
            move |entry| documents.lock().push(entry.clone()),
            ListenerFilter::scope(RecordScope::Document),
        );
        let remote = Arc::clone(&remote);
        store.add_listener_with(
            move |entry| remote.lock().push(entry.clone()),
            ListenerFilter::source(ChangeSource::Remote),
        );
    }

    put_user(&store, [counter("counter:1", 1), camera("camera:1", 0)]);
    put_user(&store, [camera("camera:1", 5)]);
    store.put([counter("counter:2", 1)], ChangeSource::Remote).unwrap();
    store.tick();

    let documents = documents.lock();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].changes.len(), 1);
    assert!(documents[0].changes.added.contains_key(&id("counter:1")));

    let remote = remote.lock();
    assert_eq!(remote.len(), 1);
    assert!(remote[0].changes.added.contains_key(&id("counter:2")));
}

#[test]
fn test_channel_subscription() {
    let store = store();
    let all = store.subscribe_all();
    let instance_only = store.subscribe(SubscriptionConfig {
        filter: ListenerFilter::scope(RecordScope::Instance),
        ..Default::default()
    });

    put_user(&store, [counter("counter:1", 1)]);
    store.tick();
    put_user(&store, [camera("camera:1", 1)]);
    store.tick();

    let events = all.drain();
    assert_eq!(events.len(), 2);
    match instance_only.recv_timeout(Duration::from_millis(100)).unwrap() {
        StoreEvent::Changes { entry } => {
            assert!(entry.changes.added.contains_key(&id("camera:1")));
        }
        other => panic!("Expected Changes event, got {:?}", other),
    }
    assert!(instance_only.try_recv().is_err());

    store.unsubscribe(all.id);
    put_user(&store, [counter("counter:2", 1)]);
    store.tick();
    assert!(matches!(all.drain().as_slice(), [StoreEvent::Dropped { .. }]));
}

// --- Undo and Replay ---

#[test]
fn test_reverse_diff_undoes_changes() {
    let store = store();
    put_user(&store, [counter("counter:1", 1), counter("counter:2", 2)]);
    let before = store.all_records();

    let ((), changes) = store.extracting_changes(|| {
        store
            .update(&id("counter:1"), |r| r.with_field("value", json!(10)), ChangeSource::User)
            .unwrap();
        store.remove([&id("counter:2")], ChangeSource::User);
        put_user(&store, [counter("counter:3", 3)]);
    });
    assert_eq!(changes.len(), 3);

    store.apply_diff(&changes.reversed(), ChangeSource::User).unwrap();
    assert_eq!(store.all_records(), before);

    // Redo.
    store.apply_diff(&changes, ChangeSource::User).unwrap();
    assert_eq!(store.get(&id("counter:1")).unwrap().get("value"), Some(&json!(10)));
    assert!(!store.has(&id("counter:2")));
    assert!(store.has(&id("counter:3")));
}

#[test]
fn test_replay_history_into_second_store() {
    let source = store();
    let replica = store();
    let forward = Arc::new(Mutex::new(Vec::new()));
    {
        let forward = Arc::clone(&forward);
        source.add_listener(move |entry| forward.lock().push(entry.changes.clone()));
    }

    put_user(&source, [counter("counter:1", 1), camera("camera:1", 1)]);
    source.tick();
    put_user(&source, [counter("counter:1", 2)]);
    source.tick();
    source.remove([&id("camera:1")], ChangeSource::User);
    source.tick();
    assert_eq!(forward.lock().len(), 3);

    for diff in forward.lock().iter() {
        replica.apply_diff(diff, ChangeSource::Remote).unwrap();
    }
    assert_eq!(replica.all_records(), source.all_records());
}

// --- Snapshots ---

#[test]
fn test_snapshot_round_trip() {
    let store = store();
    put_user(
        &store,
        [counter("counter:1", 1), counter("counter:2", 2), camera("camera:1", 3)],
    );

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(!snapshot.records.contains_key(&id("camera:1")));
    assert_eq!(store.serialize(None).len(), 3);

    let restored = store_with(StoreSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap());
    assert!(restored.load_issues().is_empty());
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.get(&id("counter:2")), store.get(&id("counter:2")));
    assert_eq!(restored.history(), 0);

    let packed = StoreSnapshot::from_msgpack(&snapshot.to_msgpack().unwrap()).unwrap();
    assert_eq!(
        packed.content_hash().unwrap(),
        restored.snapshot().content_hash().unwrap()
    );
}

// --- Queries and Creation ---

#[test]
fn test_queries() {
    let store = store();
    put_user(
        &store,
        (1..=5).map(|i| counter(&format!("counter:{i}"), i)),
    );
    put_user(&store, [camera("camera:1", 0)]);

    let query = store.query();
    assert_eq!(query.count("counter"), 5);
    assert_eq!(query.count("camera"), 1);
    assert_eq!(query.count("asset"), 0);

    let big = query.filter("counter", |r| r.get("value").and_then(|v| v.as_i64()) > Some(3));
    assert_eq!(big.len(), 2);
    assert!(query.ids("counter").contains(&id("counter:5")));

    store.remove([&id("counter:5")], ChangeSource::User);
    assert_eq!(store.query().count("counter"), 4);
}

#[test]
fn test_create_from_record_type() {
    let store = store();
    let camera_type = store.schema().record_type("camera").unwrap().clone();

    let record = camera_type
        .create(common::props(json!({"x": 10})))
        .unwrap();
    store.put([record.clone()], ChangeSource::User).unwrap();

    let stored = store.get(record.id()).unwrap();
    assert_eq!(stored.get("x"), Some(&json!(10)));
    assert_eq!(stored.get("z"), Some(&json!(1)));

    let document = store.schema().record_type("document").unwrap();
    let singleton = document
        .create_with_id(document.create_custom_id("document"), common::props(json!({"name": "Plan"})))
        .unwrap();
    store.put([singleton], ChangeSource::User).unwrap();
    assert!(store.has(&id("document:document")));
}

#[test]
fn test_props_and_debug() {
    let store = Store::new(
        common::schema(),
        StoreConfig {
            props: json!({"documentId": "abc"}),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(store.props()["documentId"], "abc");
    assert!(format!("{:?}", store).contains("records: 0"));
}
