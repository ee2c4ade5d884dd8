use rusqlite::Connection;
use thoughtkeeper_core::db::{open_db, open_db_in_memory};
use thoughtkeeper_core::{
    DocumentPatch, DocumentStore, KeyValueStore, ManualClock, NullBus, SqliteKeyValueStore,
    StorageError, StoreError, Thought,
};
use time::macros::datetime;
use time::Duration;

fn clock() -> ManualClock {
    ManualClock::ticking(datetime!(2024-03-01 08:00 UTC), Duration::seconds(1))
}

fn row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM kv_entries;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn engine_set_get_remove_and_keys() {
    let conn = open_db_in_memory().unwrap();
    let storage = SqliteKeyValueStore::new(&conn);

    storage.set("a", "1").unwrap();
    storage.set("a", "2").unwrap();
    storage.set("b", "3").unwrap();
    assert_eq!(storage.get("a").unwrap().as_deref(), Some("2"));

    storage.remove("b").unwrap();
    let mut keys = storage.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string()]);
    assert_eq!(storage.get("missing").unwrap(), None);
}

#[test]
fn engine_quota_counts_replaced_value_once() {
    let conn = open_db_in_memory().unwrap();
    let storage = SqliteKeyValueStore::with_quota(&conn, 10);

    storage.set("k", "12345678").unwrap();
    storage.set("k", "abcdefgh").unwrap();
    let err = storage.set("k2", "x").unwrap_err();

    assert!(matches!(
        err,
        StorageError::QuotaExceeded {
            required_bytes: 12,
            limit_bytes: 10
        }
    ));
    assert_eq!(storage.get("k").unwrap().as_deref(), Some("abcdefgh"));
}

#[test]
fn document_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thoughtkeeper.sqlite3");
    let clock = clock();

    {
        let conn = open_db(&path).unwrap();
        let store = DocumentStore::new(SqliteKeyValueStore::new(&conn), NullBus::new(), &clock);
        store
            .save(DocumentPatch::new().thoughts(vec![Thought::new("#124").with_tags(["t"])]))
            .unwrap();
        store.repair().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let store = DocumentStore::new(SqliteKeyValueStore::new(&conn), NullBus::new(), &clock);
    let doc = store.load();
    assert!(doc.thought("#124").is_some());
    assert_eq!(doc.tags.get("t"), Some(&1));
    assert_eq!(doc.next_thought_id, 125);
    assert_eq!(store.list_backups().unwrap().len(), 1);
}

#[test]
fn quota_rejection_leaves_table_empty() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let store = DocumentStore::new(
        SqliteKeyValueStore::with_quota(&conn, 128),
        NullBus::new(),
        &clock,
    );

    let err = store.save(DocumentPatch::new()).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Storage(StorageError::QuotaExceeded { .. })
    ));
    assert_eq!(row_count(&conn), 0);
}
