//! Executor Ordering Tests
//!
//! Tests for invariants:
//! - Tasks complete in submission order, whatever their duration
//! - Operations issued before a durable store is loaded wait for the load
//! - Mutations joined together observe each other in submission order

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tidedb::executor::{Executor, ExecutorError};
use tidedb::{Datastore, DatastoreOptions, RemoveOptions, UpdateOptions};

// =============================================================================
// Executor Tests
// =============================================================================

/// Slow early tasks still finish before fast later ones start.
#[tokio::test]
async fn test_no_two_tasks_overlap() {
    let executor = Executor::new(true).unwrap();
    let running = Arc::new(Mutex::new(0usize));
    let max_seen = Arc::new(Mutex::new(0usize));

    let mut pending = Vec::new();
    for i in 0..8u64 {
        let running = Arc::clone(&running);
        let max_seen = Arc::clone(&max_seen);
        pending.push(executor.push(
            move || async move {
                {
                    let mut r = running.lock().unwrap();
                    *r += 1;
                    let mut m = max_seen.lock().unwrap();
                    *m = (*m).max(*r);
                }
                tokio::time::sleep(Duration::from_millis(8 - i)).await;
                *running.lock().unwrap() -= 1;
                i
            },
            false,
        ));
    }

    let mut order = Vec::new();
    for task in pending {
        order.push(task.await.unwrap());
    }
    assert_eq!(order, (0..8).collect::<Vec<_>>());
    assert_eq!(*max_seen.lock().unwrap(), 1);
}

/// Forced tasks run while ordinary ones stay buffered.
#[tokio::test]
async fn test_forced_tasks_bypass_buffer() {
    let executor = Executor::new(false).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let log = Arc::clone(&log);
        executor.push(move || async move { log.lock().unwrap().push("first") }, false)
    };
    let second = {
        let log = Arc::clone(&log);
        executor.push(move || async move { log.lock().unwrap().push("second") }, false)
    };

    let forced_log = Arc::clone(&log);
    executor
        .push(move || async move { forced_log.lock().unwrap().push("forced") }, true)
        .await
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["forced"]);

    executor.mark_ready();
    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["forced", "first", "second"]);
}

/// Building an executor outside a runtime is reported, not a panic.
#[test]
fn test_executor_needs_runtime() {
    assert_eq!(Executor::new(false).err(), Some(ExecutorError::NoRuntime));
}

// =============================================================================
// Store Ordering Tests
// =============================================================================

/// A read issued before load sees the loaded data plus earlier writes.
#[tokio::test]
async fn test_operations_wait_for_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ordered.db");
    tokio::fs::write(&path, "{\"_id\":\"seed\",\"n\":1}\n").await.unwrap();

    let store = Datastore::new(DatastoreOptions::persistent(&path)).unwrap();

    let writer = store.clone();
    let insert = tokio::spawn(async move { writer.insert(json!({"_id": "late", "n": 2})).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!insert.is_finished());

    let reader = store.clone();
    let count = tokio::spawn(async move { reader.count(json!({})).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    store.load().await.unwrap();
    insert.await.unwrap().unwrap();
    assert_eq!(count.await.unwrap().unwrap(), 2);
}

/// Joined mutations apply in the order they were issued.
#[tokio::test]
async fn test_joined_mutations_apply_in_order() {
    let store = Datastore::in_memory().unwrap();

    let (inserted, incremented, tagged, removed) = tokio::join!(
        store.insert(json!({"_id": "x", "n": 1})),
        store.update(json!({"_id": "x"}), json!({"$inc": {"n": 1}}), UpdateOptions::default()),
        store.update(json!({"n": 2}), json!({"$set": {"tag": "seen"}}), UpdateOptions::default()),
        store.remove(json!({"tag": "seen"}), RemoveOptions::default()),
    );

    inserted.unwrap();
    assert_eq!(incremented.unwrap().num_affected, 1);
    assert_eq!(tagged.unwrap().num_affected, 1);
    assert_eq!(removed.unwrap(), 1);
    assert_eq!(store.count(json!({})).await.unwrap(), 0);
}
