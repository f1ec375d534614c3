//! SQLite event store tests, including lock contention with a second writer.

use governor_broker::error::Error;
use governor_broker::model::DomainEvent;
use governor_broker::store::{EventStore, EventWriter, SqliteEventStore};
use rusqlite::Connection;
use serde_json::json;

fn blocked(unit: &str) -> DomainEvent {
    DomainEvent::UnitBlocked {
        unit_name: unit.to_string(),
        was_active: true,
        message: "oom".to_string(),
    }
}

#[test]
fn writes_are_read_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEventStore::new(dir.path().join("gs_db"));

    let mut writer = store.open().unwrap();
    writer
        .write(&DomainEvent::UnitAdded {
            unit_name: "app/1".to_string(),
        })
        .unwrap();
    writer.write(&blocked("app/1")).unwrap();
    writer.close().unwrap();

    let stored = store.read_all().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].event_name, "unit_added");
    assert_eq!(stored[0].event_data, json!({"unit_name": "app/1"}));
    assert_eq!(stored[1].event_name, "unit_blocked");
    assert_eq!(
        stored[1].event_data,
        json!({"unit_name": "app/1", "was_active": true, "message": "oom"})
    );
    assert_eq!(stored[1].event().unwrap(), blocked("app/1"));
    assert!(stored[0].id < stored[1].id);
}

#[test]
fn read_all_on_empty_store_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEventStore::new(dir.path().join("gs_db"));
    store.open().unwrap().close().unwrap();

    assert!(store.read_all().unwrap().is_empty());
}

#[test]
fn read_all_on_missing_store_fails_without_creating_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gs_db");
    let store = SqliteEventStore::new(&path);

    let err = store.read_all().unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {err:?}");
    assert!(!path.exists());
}

#[test]
fn read_all_rejects_non_json_event_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gs_db");
    let store = SqliteEventStore::new(&path);
    store.open().unwrap().close().unwrap();

    let other = Connection::open(&path).unwrap();
    other
        .execute(
            "INSERT INTO events (timestamp, event_name, event_data) VALUES (?1, ?2, ?3)",
            ["2026-01-01T00:00:00+00:00", "unit_added", "not json"],
        )
        .unwrap();

    let err = store.read_all().unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {err:?}");
}

#[test]
fn write_while_another_writer_holds_the_lock_is_store_locked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gs_db");
    let store = SqliteEventStore::new(&path);

    // Create the schema before the competing writer grabs the lock.
    let mut writer = store.open().unwrap();

    let other = Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let err = writer.write(&blocked("app/0")).unwrap_err();
    assert!(matches!(err, Error::StoreLocked), "got {err:?}");
    assert!(err.is_retryable());

    other.execute_batch("ROLLBACK;").unwrap();
    writer.write(&blocked("app/0")).unwrap();
    writer.close().unwrap();

    assert_eq!(store.read_all().unwrap().len(), 1);
}
