//! In-memory index state of a store
//!
//! Every mutation here spans all indexes and is all-or-nothing: when one
//! index rejects the change, the indexes already changed are restored
//! before the error is returned.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::index::{FieldIndex, IndexKey, IndexOptions, IndexResult, RangeQuery};
use crate::model::{date_millis, get_dot_value, Document, Query, RangeBounds};

pub(crate) const ID_FIELD: &str = "_id";

/// Indexes keyed by field name, plus the TTL registrations
pub(crate) struct StoreState {
    indexes: BTreeMap<String, FieldIndex>,
    ttl_indexes: HashMap<String, f64>,
}

impl StoreState {
    /// Empty state with the mandatory unique `_id` index
    pub(crate) fn new() -> Self {
        let mut indexes = BTreeMap::new();
        indexes.insert(
            ID_FIELD.to_string(),
            FieldIndex::new(IndexOptions::new(ID_FIELD).unique(true)),
        );
        Self {
            indexes,
            ttl_indexes: HashMap::new(),
        }
    }

    fn id_index(&self) -> Option<&FieldIndex> {
        self.indexes.get(ID_FIELD)
    }

    /// Every live document, in `_id` order
    pub(crate) fn all_documents(&self) -> Vec<Document> {
        self.id_index().map(FieldIndex::get_all).unwrap_or_default()
    }

    pub(crate) fn has_id(&self, id: &str) -> bool {
        self.id_index()
            .map(|index| !index.get_matching(&Value::String(id.to_string())).is_empty())
            .unwrap_or(false)
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub(crate) fn index_options(&self) -> Vec<IndexOptions> {
        self.indexes.values().map(|index| index.options().clone()).collect()
    }

    pub(crate) fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    /// Builds an index over the current documents and registers it. On a
    /// unique violation nothing is registered.
    pub(crate) fn create_index(&mut self, options: IndexOptions) -> IndexResult<()> {
        let mut index = FieldIndex::new(options.clone());
        index.insert_many(&self.all_documents())?;

        if let Some(seconds) = options.expire_after_seconds {
            self.ttl_indexes.insert(options.field_name.clone(), seconds);
        }
        self.indexes.insert(options.field_name, index);
        Ok(())
    }

    /// Unregisters an index; `_id` cannot be removed
    pub(crate) fn drop_index(&mut self, field: &str) -> Option<IndexOptions> {
        if field == ID_FIELD {
            return None;
        }
        self.ttl_indexes.remove(field);
        self.indexes.remove(field).map(|index| index.options().clone())
    }

    /// Replaces every index definition by `_id` plus the given ones, empty
    pub(crate) fn recreate_indexes(&mut self, definitions: impl IntoIterator<Item = IndexOptions>) {
        *self = Self::new();
        for options in definitions {
            if options.field_name == ID_FIELD {
                continue;
            }
            if let Some(seconds) = options.expire_after_seconds {
                self.ttl_indexes.insert(options.field_name.clone(), seconds);
            }
            self.indexes
                .insert(options.field_name.clone(), FieldIndex::new(options));
        }
    }

    /// Indexes the documents from scratch in every index
    pub(crate) fn reset_indexes(&mut self, docs: &[Document]) -> IndexResult<()> {
        for index in self.indexes.values_mut() {
            index.reset(docs)?;
        }
        Ok(())
    }

    /// Adds documents to every index, all or nothing
    pub(crate) fn add_to_indexes(&mut self, docs: &[Document]) -> IndexResult<()> {
        let mut indexes: Vec<&mut FieldIndex> = self.indexes.values_mut().collect();
        for i in 0..indexes.len() {
            if let Err(e) = indexes[i].insert_many(docs) {
                for done in indexes.iter_mut().take(i) {
                    done.remove_many(docs);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub(crate) fn remove_from_indexes(&mut self, docs: &[Document]) {
        for index in self.indexes.values_mut() {
            index.remove_many(docs);
        }
    }

    /// Swaps old documents for new ones in every index, all or nothing
    pub(crate) fn update_indexes(&mut self, pairs: &[(Document, Document)]) -> IndexResult<()> {
        let mut indexes: Vec<&mut FieldIndex> = self.indexes.values_mut().collect();
        for i in 0..indexes.len() {
            if let Err(e) = indexes[i].update_many(pairs) {
                for done in indexes.iter_mut().take(i) {
                    done.revert_update_many(pairs);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes a successful `update_indexes`
    pub(crate) fn revert_updates(&mut self, pairs: &[(Document, Document)]) {
        for index in self.indexes.values_mut() {
            index.revert_update_many(pairs);
        }
    }

    /// Keeps the documents that are still the indexed version of their `_id`
    pub(crate) fn still_indexed(&self, docs: Vec<Document>) -> Vec<Document> {
        let Some(id_index) = self.id_index() else {
            return Vec::new();
        };
        docs.into_iter()
            .filter(|doc| match doc.get(ID_FIELD) {
                Some(id) => id_index
                    .get_matching(id)
                    .iter()
                    .any(|current| Arc::ptr_eq(current, doc)),
                None => false,
            })
            .collect()
    }

    /// Picks the smallest candidate set an index can provide for the query.
    ///
    /// Equality on an indexed field wins, then `$in`, then range operators;
    /// otherwise every document is a candidate.
    pub(crate) fn select_candidates(&self, query: &Query) -> Vec<Document> {
        let fields = query.top_level_fields();

        for (path, condition) in &fields {
            if let (Some(value), Some(index)) = (condition.equality_value(), self.indexes.get(*path)) {
                return index.get_matching(value);
            }
        }

        for (path, condition) in &fields {
            if let (Some(values), Some(index)) = (condition.in_values(), self.indexes.get(*path)) {
                return index.get_matching_any(values);
            }
        }

        for (path, condition) in &fields {
            if let (Some(bounds), Some(index)) = (condition.range_bounds(), self.indexes.get(*path)) {
                return index.get_between_bounds(&range_query(bounds));
            }
        }

        self.all_documents()
    }

    /// Splits candidates into live and expired ones, as of `now_millis`
    pub(crate) fn partition_expired(
        &self,
        candidates: Vec<Document>,
        now_millis: f64,
    ) -> (Vec<Document>, Vec<Document>) {
        if self.ttl_indexes.is_empty() {
            return (candidates, Vec::new());
        }
        candidates
            .into_iter()
            .partition(|doc| !self.is_expired(doc, now_millis))
    }

    fn is_expired(&self, doc: &Value, now_millis: f64) -> bool {
        self.ttl_indexes.iter().any(|(field, seconds)| {
            get_dot_value(doc, field)
                .and_then(|value| date_millis(&value))
                .map(|millis| millis + seconds * 1000.0 < now_millis)
                .unwrap_or(false)
        })
    }

    /// Runs the self-checks of every index tree
    pub(crate) fn check_consistency(&self) -> IndexResult<()> {
        for index in self.indexes.values() {
            index.check_consistency()?;
        }
        Ok(())
    }
}

fn range_query(bounds: RangeBounds<'_>) -> RangeQuery<IndexKey> {
    let key = |v: Option<&Value>| v.map(|v| IndexKey::Value(v.clone()));
    RangeQuery {
        gt: key(bounds.gt),
        gte: key(bounds.gte),
        lt: key(bounds.lt),
        lte: key(bounds.lte),
    }
}
