//! Datastore Operation Tests
//!
//! Tests for invariants:
//! - Callers only ever see copies of stored documents
//! - Updates and removals touch one match unless `multi` is set
//! - Upserts insert exactly once
//! - Documents past their TTL are never returned and get removed

use serde_json::{json, Value};
use tidedb::model::{date_value, now_date};
use tidedb::{Datastore, DatastoreOptions, IndexOptions, RemoveOptions, UpdateOptions};

// =============================================================================
// Helpers
// =============================================================================

async fn seeded() -> Datastore {
    let store = Datastore::in_memory().unwrap();
    store
        .insert_many(vec![
            json!({"_id": "1", "kind": "fruit", "name": "apple", "qty": 3}),
            json!({"_id": "2", "kind": "fruit", "name": "pear", "qty": 0}),
            json!({"_id": "3", "kind": "veg", "name": "leek", "qty": 7}),
        ])
        .await
        .unwrap();
    store
}

fn millis_ago(ms: i64) -> Value {
    date_value(chrono::Utc::now().timestamp_millis() - ms)
}

// =============================================================================
// Copy Semantics Tests
// =============================================================================

/// Mutating a returned document never reaches the store.
#[tokio::test]
async fn test_returned_documents_are_copies() {
    let store = Datastore::in_memory().unwrap();
    let mut inserted = store
        .insert(json!({"_id": "c", "nested": {"list": [1, 2]}}))
        .await
        .unwrap();
    inserted["nested"]["list"][0] = json!(99);

    let mut found = store.find_one(json!({"_id": "c"})).await.unwrap().unwrap();
    assert_eq!(found["nested"]["list"], json!([1, 2]));
    found["nested"] = json!(null);

    let mut all = store.get_all_data();
    all[0]["extra"] = json!(true);

    assert_eq!(
        store.get_all_data(),
        vec![json!({"_id": "c", "nested": {"list": [1, 2]}})]
    );
}

/// The input value is not modified when `_id` is generated.
#[tokio::test]
async fn test_insert_leaves_input_untouched() {
    let store = Datastore::in_memory().unwrap();
    let input = json!({"a": 1});
    let stored = store.insert(input.clone()).await.unwrap();
    assert_eq!(input, json!({"a": 1}));
    assert!(stored["_id"].is_string());
    assert_eq!(stored["a"], json!(1));
}

/// An `_id` already present is a unique violation and nothing is stored.
#[tokio::test]
async fn test_duplicate_id_rejected() {
    let store = seeded().await;
    let err = store
        .insert(json!({"_id": "1", "name": "dup"}))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(store.count(json!({})).await.unwrap(), 3);
}

// =============================================================================
// Update Tests
// =============================================================================

#[tokio::test]
async fn test_update_single_vs_multi() {
    let store = seeded().await;

    let outcome = store
        .update(json!({"kind": "fruit"}), json!({"$set": {"ripe": true}}), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.num_affected, 1);
    assert!(outcome.updated_docs.is_empty());
    assert_eq!(store.count(json!({"ripe": true})).await.unwrap(), 1);

    let outcome = store
        .update(
            json!({"kind": "fruit"}),
            json!({"$inc": {"qty": 1}}),
            UpdateOptions::multi().returning(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.num_affected, 2);
    assert_eq!(outcome.updated_docs.len(), 2);
    assert!(!outcome.upserted);

    let apple = store.find_one(json!({"name": "apple"})).await.unwrap().unwrap();
    assert_eq!(apple["qty"], json!(4));
}

/// A plain replacement keeps the `_id` and drops other fields.
#[tokio::test]
async fn test_replacement_update() {
    let store = seeded().await;
    store
        .update(json!({"_id": "3"}), json!({"name": "onion"}), UpdateOptions::default())
        .await
        .unwrap();
    let doc = store.find_one(json!({"_id": "3"})).await.unwrap().unwrap();
    assert_eq!(doc, json!({"_id": "3", "name": "onion"}));
}

/// Changing `_id` is refused and the document is unchanged.
#[tokio::test]
async fn test_update_cannot_change_id() {
    let store = seeded().await;
    let err = store
        .update(json!({"_id": "1"}), json!({"$set": {"_id": "9"}}), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TIDE_INVALID_UPDATE");
    assert_eq!(store.count(json!({"_id": "1"})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_without_match() {
    let store = seeded().await;
    let outcome = store
        .update(json!({"name": "kiwi"}), json!({"$set": {"qty": 1}}), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.num_affected, 0);
    assert!(!outcome.upserted);
    assert_eq!(store.count(json!({})).await.unwrap(), 3);
}

// =============================================================================
// Upsert Tests
// =============================================================================

/// Upserting twice inserts once, then updates the inserted document.
#[tokio::test]
async fn test_upsert_twice_with_modifiers() {
    let store = Datastore::in_memory().unwrap();

    let first = store
        .update(json!({"name": "hits"}), json!({"$inc": {"n": 1}}), UpdateOptions::upsert())
        .await
        .unwrap();
    assert!(first.upserted);
    assert_eq!(first.num_affected, 1);
    assert_eq!(first.updated_docs[0]["name"], json!("hits"));
    assert_eq!(first.updated_docs[0]["n"], json!(1));

    let second = store
        .update(json!({"name": "hits"}), json!({"$inc": {"n": 1}}), UpdateOptions::upsert())
        .await
        .unwrap();
    assert!(!second.upserted);
    assert_eq!(second.num_affected, 1);

    let docs = store.find(json!({})).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["n"], json!(2));
}

/// A plain update document is inserted as is; operators in the query are
/// not copied into it.
#[tokio::test]
async fn test_upsert_with_plain_document() {
    let store = Datastore::in_memory().unwrap();
    let outcome = store
        .update(
            json!({"age": {"$gt": 30}}),
            json!({"name": "new", "age": 40}),
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    assert!(outcome.upserted);

    let doc = &outcome.updated_docs[0];
    assert_eq!(doc["name"], json!("new"));
    assert_eq!(doc["age"], json!(40));
    assert!(doc["_id"].is_string());
}

/// With modifiers the query seeds the document, minus its operator keys.
#[tokio::test]
async fn test_upsert_drops_query_operators() {
    let store = Datastore::in_memory().unwrap();
    let outcome = store
        .update(
            json!({"city": "Oslo", "pop": {"$gt": 5}}),
            json!({"$set": {"visited": true}}),
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    let mut doc = outcome.updated_docs[0].clone();
    doc.as_object_mut().unwrap().remove("_id");
    assert_eq!(doc, json!({"city": "Oslo", "pop": {}, "visited": true}));
}

// =============================================================================
// Remove Tests
// =============================================================================

#[tokio::test]
async fn test_remove_single_vs_multi() {
    let store = seeded().await;

    let removed = store
        .remove(json!({"kind": "fruit"}), RemoveOptions::default())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count(json!({"kind": "fruit"})).await.unwrap(), 1);

    let removed = store.remove(json!({}), RemoveOptions::multi()).await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.get_all_data().is_empty());

    let removed = store.remove(json!({}), RemoveOptions::multi()).await.unwrap();
    assert_eq!(removed, 0);
}

/// Removed documents leave every secondary index.
#[tokio::test]
async fn test_remove_clears_secondary_indexes() {
    let store = seeded().await;
    store
        .ensure_index(IndexOptions::new("name").unique(true))
        .await
        .unwrap();
    store
        .remove(json!({"name": "leek"}), RemoveOptions::default())
        .await
        .unwrap();

    store
        .insert(json!({"_id": "4", "name": "leek"}))
        .await
        .unwrap();
    store.check_index_consistency().unwrap();
}

// =============================================================================
// TTL Tests
// =============================================================================

/// Expired documents are dropped from results and from the store.
#[tokio::test]
async fn test_ttl_sweep() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("seenAt").expire_after_seconds(60.0))
        .await
        .unwrap();
    store
        .insert_many(vec![
            json!({"_id": "old", "seenAt": millis_ago(120_000)}),
            json!({"_id": "fresh", "seenAt": now_date()}),
            json!({"_id": "undated", "seenAt": "yesterday"}),
            json!({"_id": "missing"}),
        ])
        .await
        .unwrap();

    let ids: Vec<String> = store
        .find(json!({}))
        .await
        .unwrap()
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["fresh", "missing", "undated"]);
    assert_eq!(store.get_all_data().len(), 3);
}

/// `dont_expire` returns expired candidates and leaves them in place.
#[tokio::test]
async fn test_candidates_dont_expire() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("at").expire_after_seconds(1.0))
        .await
        .unwrap();
    store
        .insert_many(vec![
            json!({"_id": "a", "at": millis_ago(10_000)}),
            json!({"_id": "b", "at": now_date()}),
        ])
        .await
        .unwrap();

    let all = store.get_candidates(json!({}), true).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(store.get_all_data().len(), 2);

    let live = store.get_candidates(json!({}), false).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0]["_id"], json!("b"));
    assert_eq!(store.get_all_data().len(), 1);
}

/// Counting and updating also skip expired documents.
#[tokio::test]
async fn test_ttl_applies_to_every_operation() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("at").expire_after_seconds(5.0))
        .await
        .unwrap();
    store
        .insert(json!({"_id": "stale", "at": millis_ago(60_000), "n": 0}))
        .await
        .unwrap();

    let outcome = store
        .update(json!({}), json!({"$inc": {"n": 1}}), UpdateOptions::multi())
        .await
        .unwrap();
    assert_eq!(outcome.num_affected, 0);
    assert_eq!(store.count(json!({})).await.unwrap(), 0);
}

// =============================================================================
// Candidate Selection Tests
// =============================================================================

/// An indexed equality narrows candidates before matching.
#[tokio::test]
async fn test_candidates_use_index() {
    let store = seeded().await;
    store.ensure_index(IndexOptions::new("kind")).await.unwrap();

    let candidates = store
        .get_candidates(json!({"kind": "fruit", "qty": {"$gt": 100}}), false)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);

    let candidates = store
        .get_candidates(json!({"kind": {"$in": ["veg", "fruit"]}}), false)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 3);

    // no index on qty: every document is a candidate
    let candidates = store
        .get_candidates(json!({"qty": 3}), false)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 3);
}

/// Integers past 2^53 stay distinct keys in a unique index.
#[tokio::test]
async fn test_unique_index_on_large_integers() {
    let store = Datastore::in_memory().unwrap();
    store
        .ensure_index(IndexOptions::new("n").unique(true))
        .await
        .unwrap();

    store.insert(json!({"n": 9_007_199_254_740_993_i64})).await.unwrap();
    store.insert(json!({"n": 9_007_199_254_740_992_i64})).await.unwrap();
    assert_eq!(store.count(json!({})).await.unwrap(), 2);
    assert_eq!(
        store.count(json!({"n": 9_007_199_254_740_993_i64})).await.unwrap(),
        1
    );

    let err = store
        .insert(json!({"n": 9_007_199_254_740_993_i64}))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

/// Loading an in-memory store is a no-op, however often it is called.
#[tokio::test]
async fn test_in_memory_load_twice() {
    let store = seeded().await;
    store.load().await.unwrap();
    store.load().await.unwrap();
    assert_eq!(store.count(json!({})).await.unwrap(), 3);
}

/// Timestamps are added on insert and kept through replacements.
#[tokio::test]
async fn test_timestamps_on_replacement() {
    let store = Datastore::new(DatastoreOptions::in_memory().timestamp_data(true)).unwrap();
    let doc = store.insert(json!({"_id": "t", "a": 1})).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .update(json!({"_id": "t"}), json!({"b": 2}), UpdateOptions::default())
        .await
        .unwrap();
    let updated = store.find_one(json!({"_id": "t"})).await.unwrap().unwrap();
    assert_eq!(updated["createdAt"], doc["createdAt"]);
    assert_ne!(updated["updatedAt"], doc["updatedAt"]);
    assert!(updated.get("a").is_none());
    assert_eq!(updated["b"], json!(2));
}

/// Clones share one store.
#[tokio::test]
async fn test_clones_share_state() {
    let store = Datastore::in_memory().unwrap();
    let other = store.clone();
    other.insert(json!({"_id": "shared"})).await.unwrap();
    assert_eq!(store.count(json!({"_id": "shared"})).await.unwrap(), 1);
}
