//! Index Rollback Tests
//!
//! Tests for invariants:
//! - A failed multi-document operation leaves every index as it was
//! - A failed mutation through the store leaves every index as it was
//! - Array fan-out keys are undone together

use std::sync::Arc;

use serde_json::{json, Value};
use tidedb::index::{FieldIndex, IndexOptions};
use tidedb::model::Document;
use tidedb::{Datastore, UpdateOptions};

// =============================================================================
// Helper Functions
// =============================================================================

fn doc(value: Value) -> Document {
    Arc::new(value)
}

fn ids(docs: &[Document]) -> Vec<String> {
    let mut ids: Vec<String> = docs
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

fn snapshot(index: &FieldIndex) -> Vec<String> {
    ids(&index.get_all())
}

// =============================================================================
// FieldIndex Rollback Tests
// =============================================================================

/// insert_many failing on the third document removes the first two.
#[test]
fn test_insert_many_failure_restores_index() {
    let mut index = FieldIndex::new(IndexOptions::new("email").unique(true));
    index.insert(&doc(json!({"_id": "0", "email": "taken"}))).unwrap();
    let before = snapshot(&index);

    let batch = vec![
        doc(json!({"_id": "1", "email": "a"})),
        doc(json!({"_id": "2", "email": "b"})),
        doc(json!({"_id": "3", "email": "taken"})),
        doc(json!({"_id": "4", "email": "c"})),
    ];
    let err = index.insert_many(&batch).unwrap_err();
    assert_eq!(err.code(), "TIDE_UNIQUE_VIOLATED");

    assert_eq!(snapshot(&index), before);
    assert!(index.get_matching(&json!("a")).is_empty());
    index.check_consistency().unwrap();
}

/// A document whose array clashes on its last element leaves no key behind.
#[test]
fn test_fan_out_failure_restores_index() {
    let mut index = FieldIndex::new(IndexOptions::new("tags").unique(true));
    index.insert(&doc(json!({"_id": "0", "tags": ["z"]}))).unwrap();

    let clash = doc(json!({"_id": "1", "tags": ["x", "y", "z"]}));
    index.insert(&clash).unwrap_err();

    assert!(index.get_matching(&json!("x")).is_empty());
    assert!(index.get_matching(&json!("y")).is_empty());
    assert_eq!(index.len_keys(), 1);
}

/// update_many failing midway restores every old document.
#[test]
fn test_update_many_failure_restores_index() {
    let mut index = FieldIndex::new(IndexOptions::new("n").unique(true));
    let a = doc(json!({"_id": "a", "n": 1}));
    let b = doc(json!({"_id": "b", "n": 2}));
    let c = doc(json!({"_id": "c", "n": 3}));
    index.insert_many(&[a.clone(), b.clone(), c.clone()]).unwrap();

    let pairs = vec![
        (a.clone(), doc(json!({"_id": "a", "n": 10}))),
        (b.clone(), doc(json!({"_id": "b", "n": 3}))),
    ];
    index.update_many(&pairs).unwrap_err();

    for (old, n) in [(&a, 1), (&b, 2), (&c, 3)] {
        let found = index.get_matching(&json!(n));
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], old));
    }
    assert!(index.get_matching(&json!(10)).is_empty());
}

/// revert_update_many after a successful update is an exact undo.
#[test]
fn test_revert_update_many_is_exact() {
    let mut index = FieldIndex::new(IndexOptions::new("n"));
    let a = doc(json!({"_id": "a", "n": 1}));
    let b = doc(json!({"_id": "b", "n": 1}));
    index.insert_many(&[a.clone(), b.clone()]).unwrap();

    let pairs = vec![
        (a.clone(), doc(json!({"_id": "a", "n": 5}))),
        (b.clone(), doc(json!({"_id": "b", "n": 6}))),
    ];
    index.update_many(&pairs).unwrap();
    assert!(index.get_matching(&json!(1)).is_empty());

    index.revert_update_many(&pairs);
    assert_eq!(ids(&index.get_matching(&json!(1))), vec!["a", "b"]);
    assert!(index.get_matching(&json!(5)).is_empty());
    index.check_consistency().unwrap();
}

// =============================================================================
// Store-Level Rollback Tests
// =============================================================================

/// A batch insert rejected by a secondary index leaves no trace anywhere.
#[tokio::test]
async fn test_store_insert_many_is_atomic() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("email").unique(true))
        .await
        .unwrap();
    store.insert(json!({"_id": "0", "email": "taken"})).await.unwrap();

    let err = store
        .insert_many(vec![
            json!({"_id": "1", "email": "free"}),
            json!({"_id": "2", "email": "taken"}),
        ])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    assert_eq!(store.get_all_data().len(), 1);
    assert_eq!(store.count(json!({"email": "free"})).await.unwrap(), 0);
    store.check_index_consistency().unwrap();
}

/// A multi update that would break a unique index changes nothing.
#[tokio::test]
async fn test_store_update_is_atomic() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("slot").unique(true))
        .await
        .unwrap();
    store
        .insert_many(vec![
            json!({"_id": "a", "slot": 1, "group": "g"}),
            json!({"_id": "b", "slot": 2, "group": "g"}),
        ])
        .await
        .unwrap();

    let err = store
        .update(
            json!({"group": "g"}),
            json!({"$set": {"slot": 9}}),
            UpdateOptions::multi(),
        )
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    let docs = store.find(json!({"slot": {"$in": [1, 2]}})).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(store.count(json!({"slot": 9})).await.unwrap(), 0);
    store.check_index_consistency().unwrap();
}
