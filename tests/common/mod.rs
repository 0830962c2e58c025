//! Record types and store helpers shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use record_store::validate::{
    self, any, boolean, dict_of, literal, number, object, positive_number, string, union,
};
use record_store::{
    ChangeSource, HistoryEntry, Migrations, Record, RecordScope, RecordType, Schema, Store,
    StoreConfig, StoreSnapshot, SubTypeMigrations, TickScheduler,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// `counter` v1: `count` was renamed to `value`.
pub fn counter_type() -> RecordType {
    RecordType::new(
        "counter",
        validate::model(
            "counter",
            object([
                ("typeName", literal("counter")),
                ("id", validate::id_validator("counter")),
                ("value", number()),
            ]),
        ),
        Migrations::new(1).with_step(
            1,
            |record| rename_field(record, "count", "value"),
            |record| rename_field(record, "value", "count"),
        ),
        RecordScope::Document,
    )
}

pub fn camera_type() -> RecordType {
    RecordType::new(
        "camera",
        validate::model(
            "camera",
            object([
                ("typeName", literal("camera")),
                ("id", validate::id_validator("camera")),
                ("x", number()),
                ("y", number()),
                ("z", positive_number()),
            ]),
        ),
        Migrations::none(),
        RecordScope::Instance,
    )
    .with_default_properties(|| props(json!({"x": 0, "y": 0, "z": 1})))
}

pub fn pointer_type() -> RecordType {
    RecordType::new(
        "pointer",
        validate::model(
            "pointer",
            object([
                ("typeName", literal("pointer")),
                ("id", validate::id_validator("pointer")),
                ("x", number()),
                ("y", number()),
            ]),
        ),
        Migrations::none(),
        RecordScope::Presence,
    )
}

pub fn document_type() -> RecordType {
    RecordType::new(
        "document",
        validate::model(
            "document",
            object([
                ("typeName", literal("document")),
                ("id", literal("document:document")),
                ("name", string()),
                ("gridSize", positive_number().optional()),
            ]),
        ),
        Migrations::none(),
        RecordScope::Document,
    )
    .with_default_properties(|| props(json!({"name": ""})))
}

/// `asset` v1 added `meta`. Its `props` follow a per-`type` chain:
/// `image` v1 renamed `url` to `src`, v2 added `isAnimated`;
/// `video` v1 added `autoplay`.
pub fn asset_type() -> RecordType {
    let base = |kind: &str, extra: (&str, validate::Validator)| {
        object([
            ("typeName", literal("asset")),
            ("id", validate::id_validator("asset")),
            ("type", literal(kind)),
            ("meta", dict_of(any())),
            (
                "props",
                object([
                    ("w", number()),
                    ("h", number()),
                    ("src", string().nullable()),
                    extra,
                ]),
            ),
        ])
    };

    let image = Migrations::new(2)
        .with_step(
            1,
            |payload| rename_field(payload, "url", "src"),
            |payload| rename_field(payload, "src", "url"),
        )
        .with_step(
            2,
            |payload| set_field(payload, "isAnimated", json!(false)),
            |payload| drop_field(payload, "isAnimated"),
        );
    let video = Migrations::new(1).with_step(
        1,
        |payload| set_field(payload, "autoplay", json!(true)),
        |payload| drop_field(payload, "autoplay"),
    );

    RecordType::new(
        "asset",
        validate::model(
            "asset",
            union(
                "type",
                [
                    ("image", base("image", ("isAnimated", boolean()))),
                    ("video", base("video", ("autoplay", boolean()))),
                ],
            ),
        ),
        Migrations::new(1)
            .with_step(
                1,
                |record| set_field(record, "meta", json!({})),
                |record| drop_field(record, "meta"),
            )
            .with_sub_types(SubTypeMigrations::new("type").with("image", image).with("video", video)),
        RecordScope::Document,
    )
}

/// Route store logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new([
            counter_type(),
            camera_type(),
            pointer_type(),
            document_type(),
            asset_type(),
        ])
        .unwrap(),
    )
}

pub fn store() -> Store {
    Store::new(schema(), StoreConfig::default()).unwrap()
}

/// A store whose flushes wait for `tick()`.
pub fn tick_store() -> (Store, Arc<TickScheduler>) {
    let scheduler = Arc::new(TickScheduler::new());
    let store = Store::new(
        schema(),
        StoreConfig {
            scheduler: Some(scheduler.clone()),
            ..Default::default()
        },
    )
    .unwrap();
    (store, scheduler)
}

pub fn store_with(snapshot: StoreSnapshot) -> Store {
    init_tracing();
    Store::new(
        schema(),
        StoreConfig {
            initial_data: Some(snapshot),
            ..Default::default()
        },
    )
    .unwrap()
}

/// Collect every flushed entry.
pub fn record_history(store: &Store) -> Arc<Mutex<Vec<HistoryEntry>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.add_listener(move |entry| sink.lock().push(entry.clone()));
    seen
}

pub fn counter(id: &str, value: i64) -> Record {
    Record::from_value(json!({"typeName": "counter", "id": id, "value": value})).unwrap()
}

pub fn camera(id: &str, x: i64) -> Record {
    Record::from_value(json!({"typeName": "camera", "id": id, "x": x, "y": 0, "z": 1})).unwrap()
}

pub fn put_user(store: &Store, records: impl IntoIterator<Item = Record>) {
    store.put(records, ChangeSource::User).unwrap();
}

pub fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn rename_field(mut value: Value, from: &str, to: &str) -> Value {
    if let Some(fields) = value.as_object_mut() {
        if let Some(moved) = fields.remove(from) {
            fields.insert(to.to_string(), moved);
        }
    }
    value
}

fn set_field(mut value: Value, key: &str, default: Value) -> Value {
    if let Some(fields) = value.as_object_mut() {
        fields.entry(key.to_string()).or_insert(default);
    }
    value
}

fn drop_field(mut value: Value, key: &str) -> Value {
    if let Some(fields) = value.as_object_mut() {
        fields.remove(key);
    }
    value
}
