use serde_json::{json, Value};
use thoughtkeeper_core::config::StoreConfig;
use thoughtkeeper_core::{
    DocumentPatch, DocumentStore, KeyValueStore, ManualClock, MemoryKeyValueStore, Model, NullBus,
    StorageError, StoreError, TagCounts, Thought, ValidationError, DATA_VERSION,
};
use time::macros::datetime;
use time::Duration;

fn clock() -> ManualClock {
    ManualClock::ticking(datetime!(2024-03-01 08:00 UTC), Duration::milliseconds(5))
}

fn canonical_key() -> String {
    StoreConfig::default().canonical_key
}

fn stored_json(storage: &MemoryKeyValueStore) -> Value {
    let raw = storage.get(&canonical_key()).unwrap().unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn empty_storage_loads_defaults_without_writing() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();

    assert!(doc.thoughts.is_empty());
    assert!(doc.models.is_empty());
    assert_eq!(doc.next_thought_id, 124);
    assert_eq!(doc.next_model_id, 81);
    assert_eq!(doc.current_version, "v22.48");
    assert_eq!(doc.data_version, DATA_VERSION);
    assert_eq!(doc.timeline.len(), 10);
    assert!(storage.is_empty());
}

#[test]
fn legacy_document_is_migrated_and_persisted() {
    let storage = MemoryKeyValueStore::new();
    storage
        .set(
            &canonical_key(),
            r##"{"thoughts":[{"id":"#1","content":"kept"}],"dataVersion":"0.9"}"##,
        )
        .unwrap();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();

    assert_eq!(doc.data_version, DATA_VERSION);
    assert!(doc.models.is_empty());
    assert_eq!(doc.thoughts.len(), 1);
    assert_eq!(
        doc.thought("#1").unwrap().get("content"),
        Some(&json!("kept"))
    );
    let stored = stored_json(&storage);
    assert_eq!(stored["dataVersion"], json!(DATA_VERSION));
    assert_eq!(stored["nextModelId"], json!(81));
}

#[test]
fn migration_is_idempotent_once_persisted() {
    let storage = MemoryKeyValueStore::new();
    storage
        .set(&canonical_key(), r#"{"thoughts":[],"dataVersion":"1.0"}"#)
        .unwrap();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let first = store.load();
    let raw_after_first = storage.get(&canonical_key()).unwrap();
    let second = store.load();

    assert_eq!(first, second);
    assert_eq!(storage.get(&canonical_key()).unwrap(), raw_after_first);
}

#[test]
fn current_document_missing_fields_is_backfilled() {
    let storage = MemoryKeyValueStore::new();
    storage
        .set(
            &canonical_key(),
            r#"{"thoughts":[],"models":[],"tags":{},"currentVersion":"v1","dataVersion":"2.0"}"#,
        )
        .unwrap();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();

    assert_eq!(doc.current_version, "v1");
    assert_eq!(doc.timeline.len(), 10);
    assert_eq!(stored_json(&storage)["nextThoughtId"], json!(124));
}

#[test]
fn save_merges_patch_and_stamps_times() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let saved = store
        .save(
            DocumentPatch::new()
                .thoughts(vec![Thought::new("#124").with_tags(["focus"])])
                .current_version("v22.49")
                .set("theme", "dark"),
        )
        .unwrap();

    assert_eq!(saved.thoughts.len(), 1);
    assert_eq!(saved.current_version, "v22.49");
    assert_eq!(saved.extra.get("theme"), Some(&json!("dark")));
    assert_eq!(saved.last_saved, saved.last_modified);
    assert_eq!(saved.timeline.len(), 10);

    let reloaded = store.load();
    assert_eq!(reloaded, saved);
}

#[test]
fn duplicate_thought_ids_are_rejected_and_storage_is_unchanged() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);
    store
        .save(DocumentPatch::new().thoughts(vec![Thought::new("#1")]))
        .unwrap();
    let before = storage.get(&canonical_key()).unwrap();

    let err = store
        .save(DocumentPatch::new().thoughts(vec![Thought::new("#1"), Thought::new("#1")]))
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::DuplicateThoughtId(ref id)) if id == "#1"
    ));
    assert_eq!(storage.get(&canonical_key()).unwrap(), before);
}

#[test]
fn duplicate_model_ids_are_rejected() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let err = store
        .save(DocumentPatch::new().models(vec![Model::new("M-1", "a"), Model::new("M-1", "b")]))
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::DuplicateModelId(_))
    ));
    assert!(storage.is_empty());
}

#[test]
fn wrongly_typed_patch_is_rejected() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let err = store
        .save(DocumentPatch::new().set("thoughts", "not a list"))
        .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert!(storage.is_empty());
}

#[test]
fn quota_failure_leaves_storage_untouched() {
    let storage = MemoryKeyValueStore::with_quota(64);
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let err = store.save(DocumentPatch::new()).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Storage(StorageError::QuotaExceeded { limit_bytes: 64, .. })
    ));
    assert!(storage.is_empty());
}

#[test]
fn unavailable_storage_loads_defaults_and_rejects_writes() {
    let storage = MemoryKeyValueStore::new();
    storage.set_disabled(true);
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();
    assert_eq!(doc.next_thought_id, 124);
    assert!(store.try_load().is_err());

    let err = store.save(DocumentPatch::new()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Storage(StorageError::Unavailable(_))
    ));
}

#[test]
fn corrupt_value_loads_defaults_and_is_backed_up_before_overwrite() {
    let storage = MemoryKeyValueStore::new();
    storage.set(&canonical_key(), "{not json").unwrap();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();
    assert!(doc.thoughts.is_empty());
    assert_eq!(
        storage.get(&canonical_key()).unwrap().as_deref(),
        Some("{not json")
    );

    store
        .save(DocumentPatch::new().thoughts(vec![Thought::new("#1")]))
        .unwrap();

    let backups = store.list_backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        storage.get(&backups[0].key).unwrap().as_deref(),
        Some("{not json")
    );
}

#[test]
fn export_then_import_round_trips_collections() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);
    let original = store
        .save(
            DocumentPatch::new()
                .thoughts(vec![
                    Thought::new("#124").with_tags(["a"]),
                    Thought::new("#125").with_field("content", "second"),
                ])
                .models(vec![Model::new("M-81", "Loop").with_tags(["a"])]),
        )
        .unwrap();

    let exported = store.export_json().unwrap();
    let exported_value: Value = serde_json::from_str(&exported).unwrap();
    assert_eq!(exported_value["exportInfo"]["source"], json!("思维协同处理器"));
    assert_eq!(exported_value["exportInfo"]["version"], json!("v22.48"));

    let other_storage = MemoryKeyValueStore::new();
    let other = DocumentStore::new(&other_storage, NullBus::new(), &clock);
    let imported = other.import_json(&exported).unwrap();

    assert_eq!(imported.thoughts, original.thoughts);
    assert_eq!(imported.models, original.models);
    assert_eq!(imported.tags, original.tags);
    assert_eq!(imported.timeline, original.timeline);
    assert!(!imported.extra.contains_key("exportInfo"));
}

#[test]
fn import_rejects_unusable_input_without_writing() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    for input in ["not json", "[]", r#"{"thoughts":[]}"#, r#"{"models":[]}"#] {
        let err = store.import_json(input).unwrap_err();
        assert!(matches!(err, StoreError::InvalidImport(_)), "{input}");
    }
    assert!(storage.is_empty());
}

#[test]
fn import_backs_up_live_document_and_migrates_legacy_data() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);
    store
        .save(DocumentPatch::new().thoughts(vec![Thought::new("#1")]))
        .unwrap();

    let imported = store
        .import_json(r##"{"thoughts":[{"id":"#9"}],"models":[],"dataVersion":"1.0"}"##)
        .unwrap();

    assert_eq!(imported.data_version, DATA_VERSION);
    assert!(imported.thought("#9").is_some());
    assert_eq!(store.list_backups().unwrap().len(), 1);
}

#[test]
fn stats_reflect_loaded_document() {
    let storage = MemoryKeyValueStore::new();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);
    let mut tags = TagCounts::new();
    tags.insert("x".to_string(), 1);
    store
        .save(
            DocumentPatch::new()
                .thoughts(vec![Thought::new("#1").with_tags(["x"])])
                .tags(&tags),
        )
        .unwrap();

    let stats = store.stats();

    assert_eq!(stats.thoughts, 1);
    assert_eq!(stats.models, 0);
    assert_eq!(stats.tags, 1);
    assert_eq!(stats.timeline, 10);
    assert_eq!(stats.model_connections, 8);
    assert_eq!(stats.data_version, DATA_VERSION);
}

#[test]
fn mistyped_milestone_and_counter_keep_thoughts_and_back_up_before_save() {
    let storage = MemoryKeyValueStore::new();
    let raw = r##"{"thoughts":[{"id":"#1"},{"id":"#2"}],"models":[],"tags":{},"timeline":[{"id":1,"version":"v1","date":"2024-01-01","event":"start"}],"currentVersion":"v1","dataVersion":"2.0","nextThoughtId":"3"}"##;
    storage.set(&canonical_key(), raw).unwrap();
    let clock = clock();
    let store = DocumentStore::new(&storage, NullBus::new(), &clock);

    let doc = store.load();
    assert_eq!(doc.thoughts.len(), 2);
    assert_eq!(doc.next_thought_id, 3);
    assert_eq!(doc.timeline[0].id, "1");
    assert_eq!(storage.get(&canonical_key()).unwrap().as_deref(), Some(raw));

    let saved = store
        .save(DocumentPatch::new().current_version("v2"))
        .unwrap();

    assert_eq!(saved.thoughts.len(), 2);
    assert_eq!(stored_json(&storage)["nextThoughtId"], json!(3));
    let backups = store.list_backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(storage.get(&backups[0].key).unwrap().as_deref(), Some(raw));
}
