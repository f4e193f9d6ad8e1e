//! Per-field index
//!
//! Wraps one `BinarySearchTree` keyed by the value of a dotted field path.
//! Documents are shared `Arc`s, so the same allocation sits in every index
//! of a store and values are told apart by pointer.
//!
//! # Keys
//!
//! - An absent field is indexed under `IndexKey::Undefined`, unless the
//!   index is sparse, in which case the document is skipped
//! - An array field fans out into one key per distinct element
//!
//! # Invariants
//!
//! - Multi-document operations are all-or-nothing: on failure, everything
//!   the call already did is undone before the error is returned

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{IndexError, IndexResult};
use super::tree::{BinarySearchTree, KeyConflict, RangeQuery, ReplacementPolicy};
use crate::model::{compare_things, get_dot_value, Document};

/// Key of an index entry
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    /// Field absent from the document
    Undefined,
    /// Field value
    Value(Value),
}

impl IndexKey {
    /// The value, `None` for the undefined key
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            IndexKey::Undefined => None,
            IndexKey::Value(v) => Some(v),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Undefined => write!(f, "undefined"),
            IndexKey::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Index definition, as persisted in `$$indexCreated` directives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<f64>,
}

impl IndexOptions {
    /// Plain, non-unique, non-sparse index on a field
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
            expire_after_seconds: None,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Registers the field for TTL expiry
    pub fn expire_after_seconds(mut self, seconds: f64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}

/// Ordered index over one field
pub struct FieldIndex {
    options: IndexOptions,
    tree: BinarySearchTree<IndexKey, Document>,
}

impl FieldIndex {
    /// Creates an empty index with a random replacement policy
    pub fn new(options: IndexOptions) -> Self {
        Self::with_policy(options, ReplacementPolicy::random())
    }

    /// Creates an empty index with an explicit replacement policy
    pub fn with_policy(options: IndexOptions, policy: ReplacementPolicy) -> Self {
        let tree = BinarySearchTree::new(
            options.unique,
            Arc::new(|a: &IndexKey, b: &IndexKey| compare_things(a.as_value(), b.as_value(), None)),
            Arc::new(|a: &Document, b: &Document| Arc::ptr_eq(a, b)),
            policy,
        );
        Self { options, tree }
    }

    pub fn field_name(&self) -> &str {
        &self.options.field_name
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Number of distinct keys
    pub fn len_keys(&self) -> usize {
        self.tree.len_keys()
    }

    fn keys_for(&self, doc: &Value) -> Vec<IndexKey> {
        match get_dot_value(doc, &self.options.field_name) {
            None if self.options.sparse => Vec::new(),
            None => vec![IndexKey::Undefined],
            Some(value) => match value.into_owned() {
                Value::Array(items) => {
                    let mut keys: Vec<IndexKey> = Vec::with_capacity(items.len());
                    for item in items {
                        let seen = keys
                            .iter()
                            .any(|k| compare_things(k.as_value(), Some(&item), None).is_eq());
                        if !seen {
                            keys.push(IndexKey::Value(item));
                        }
                    }
                    keys
                }
                other => vec![IndexKey::Value(other)],
            },
        }
    }

    fn conflict(&self, conflict: KeyConflict<IndexKey>) -> IndexError {
        IndexError::unique_violated(&self.options.field_name, conflict.key.to_string())
    }

    /// Indexes one document; a failure leaves the index unchanged
    pub fn insert(&mut self, doc: &Document) -> IndexResult<()> {
        let keys = self.keys_for(doc);
        for (i, key) in keys.iter().enumerate() {
            if let Err(conflict) = self.tree.insert(key.clone(), Arc::clone(doc)) {
                for done in &keys[..i] {
                    self.tree.delete(done, Some(doc));
                }
                return Err(self.conflict(conflict));
            }
        }
        Ok(())
    }

    /// Indexes a batch; on failure at document k, documents before k are
    /// removed again
    pub fn insert_many(&mut self, docs: &[Document]) -> IndexResult<()> {
        for (i, doc) in docs.iter().enumerate() {
            if let Err(e) = self.insert(doc) {
                self.remove_many(&docs[..i]);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Removes every key the document fans out to
    pub fn remove(&mut self, doc: &Document) {
        for key in self.keys_for(doc) {
            self.tree.delete(&key, Some(doc));
        }
    }

    pub fn remove_many(&mut self, docs: &[Document]) {
        for doc in docs {
            self.remove(doc);
        }
    }

    /// Replaces `old` by `new`; on failure `old` is indexed again
    pub fn update(&mut self, old: &Document, new: &Document) -> IndexResult<()> {
        self.update_many(&[(Arc::clone(old), Arc::clone(new))])
    }

    /// Replaces every old document by its new one, all or nothing
    pub fn update_many(&mut self, pairs: &[(Document, Document)]) -> IndexResult<()> {
        for (old, _) in pairs {
            self.remove(old);
        }

        for (i, (_, new)) in pairs.iter().enumerate() {
            if let Err(e) = self.insert(new) {
                for (_, done) in &pairs[..i] {
                    self.remove(done);
                }
                self.restore(pairs.iter().map(|(old, _)| old));
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes a successful `update`
    pub fn revert_update(&mut self, old: &Document, new: &Document) {
        self.revert_update_many(&[(Arc::clone(old), Arc::clone(new))]);
    }

    /// Undoes a successful `update_many`
    pub fn revert_update_many(&mut self, pairs: &[(Document, Document)]) {
        for (_, new) in pairs {
            self.remove(new);
        }
        self.restore(pairs.iter().map(|(old, _)| old));
    }

    // Re-inserts documents that were indexed before the current call, so no
    // key can conflict.
    fn restore<'a>(&mut self, docs: impl Iterator<Item = &'a Document>) {
        for doc in docs {
            for key in self.keys_for(doc) {
                let _ = self.tree.insert(key, Arc::clone(doc));
            }
        }
    }

    /// Documents whose key equals the value
    pub fn get_matching(&self, value: &Value) -> Vec<Document> {
        self.tree.search(&IndexKey::Value(value.clone()))
    }

    /// Union of exact lookups, each document once, first occurrence order
    pub fn get_matching_any(&self, values: &[Value]) -> Vec<Document> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for value in values {
            for doc in self.get_matching(value) {
                if seen.insert(Arc::as_ptr(&doc)) {
                    out.push(doc);
                }
            }
        }
        out
    }

    /// Documents whose key lies within the bounds, in key order
    pub fn get_between_bounds(&self, range: &RangeQuery<IndexKey>) -> Vec<Document> {
        self.tree.between_bounds(range)
    }

    /// Every indexed document in key order. Array fan-out can repeat a
    /// document; the `_id` index never does.
    pub fn get_all(&self) -> Vec<Document> {
        self.tree.values()
    }

    /// Drops everything and indexes the given documents
    pub fn reset(&mut self, docs: &[Document]) -> IndexResult<()> {
        self.tree.clear();
        self.insert_many(docs)
    }

    /// Runs the tree self-checks
    pub fn check_consistency(&self) -> IndexResult<()> {
        self.tree.check_is_bst()?;
        self.tree.check_internal_pointers()
    }
}

impl fmt::Debug for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldIndex")
            .field("options", &self.options)
            .field("keys", &self.tree.len_keys())
            .finish()
    }
}
