//! The store facade
//!
//! Every mutation is a task on the executor, so mutations run one at a time
//! in submission order. Reads skip the queue once the store is loaded.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;

use super::errors::{DatastoreError, DatastoreResult};
use super::options::{DatastoreOptions, RemoveOptions, UpdateOptions, UpdateOutcome};
use super::state::{StoreState, ID_FIELD};
use crate::cursor::{Count, Cursor, Find, FindOne};
use crate::executor::{Executor, ExecutorError};
use crate::id::new_id;
use crate::index::IndexOptions;
use crate::model::{
    check_object, deep_copy, matches, modify, now_date, Document, ModelError, Query,
    StringComparator,
};
use crate::observability::{log_event, log_event_with_detail, Event};
use crate::persistence::{Autocompaction, LogEntry, Persistence};

#[derive(Debug, Clone, PartialEq)]
enum Lifecycle {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

struct Inner {
    options: DatastoreOptions,
    executor: Executor,
    persistence: Persistence,
    state: Mutex<StoreState>,
    lifecycle: Mutex<Lifecycle>,
    autocompaction: Mutex<Option<Autocompaction>>,
}

/// Embedded document store.
///
/// Cloning is cheap and every clone operates on the same store. A durable
/// store buffers every operation until `load` has replayed the datafile.
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<Inner>,
}

impl Datastore {
    /// Creates a store. Must be called inside a tokio runtime.
    pub fn new(options: DatastoreOptions) -> DatastoreResult<Self> {
        options.validate()?;

        let persistence = Persistence::new(
            options.datafile().map(|path| path.to_path_buf()),
            options.serialization_hook.clone(),
            options.corrupt_alert_threshold,
        )?;
        let in_memory = persistence.is_in_memory();
        let executor = Executor::new(in_memory)?;

        let lifecycle = if in_memory {
            Lifecycle::Ready
        } else {
            Lifecycle::Unloaded
        };
        let autocompaction_interval = options.autocompaction_interval_ms;

        let store = Self {
            inner: Arc::new(Inner {
                options,
                executor,
                persistence,
                state: Mutex::new(StoreState::new()),
                lifecycle: Mutex::new(lifecycle),
                autocompaction: Mutex::new(None),
            }),
        };

        if let Some(ms) = autocompaction_interval {
            store.set_autocompaction_interval(Duration::from_millis(ms))?;
        }
        Ok(store)
    }

    /// Opens an in-memory store
    pub fn in_memory() -> DatastoreResult<Self> {
        Self::new(DatastoreOptions::in_memory())
    }

    pub fn options(&self) -> &DatastoreOptions {
        &self.inner.options
    }

    pub fn is_in_memory(&self) -> bool {
        self.inner.persistence.is_in_memory()
    }

    /// Replays the datafile, rebuilds the indexes and compacts the file.
    ///
    /// Operations queued before the load run once it finishes. Loading
    /// twice is harmless: the second call waits for the first. After a
    /// failed load every operation returns `LoadFailed`.
    pub async fn load(&self) -> DatastoreResult<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let first = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Unloaded => {
                    *lifecycle = Lifecycle::Loading;
                    true
                }
                Lifecycle::Failed(reason) => return Err(DatastoreError::LoadFailed(reason.clone())),
                Lifecycle::Loading | Lifecycle::Ready => false,
            }
        };

        if !first {
            // released once the running load marks the executor ready
            self.inner.executor.push(|| async {}, false).await?;
            return self.inner.ensure_loaded();
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .push(move || async move { inner.load_database().await }, true)
            .await?
    }

    /// Inserts one document and returns a copy of what was stored
    pub async fn insert(&self, doc: Value) -> DatastoreResult<Value> {
        self.run(move |inner| async move { inner.insert_one(&doc).await })
            .await
    }

    /// Inserts a batch; either every document is stored or none is
    pub async fn insert_many(&self, docs: Vec<Value>) -> DatastoreResult<Vec<Value>> {
        self.run(move |inner| async move { inner.insert_batch(&docs).await })
            .await
    }

    /// Matches documents; chain `sort`, `skip`, `limit`, `projection`, then
    /// await or `exec`
    pub fn find(&self, query: Value) -> Cursor<Find> {
        Cursor::new(self.clone(), query)
    }

    pub fn find_one(&self, query: Value) -> Cursor<FindOne> {
        Cursor::new(self.clone(), query)
    }

    pub fn count(&self, query: Value) -> Cursor<Count> {
        Cursor::new(self.clone(), query)
    }

    /// Applies an update to the first match, or to every match with `multi`
    pub async fn update(
        &self,
        query: Value,
        update: Value,
        options: UpdateOptions,
    ) -> DatastoreResult<UpdateOutcome> {
        self.run(move |inner| async move { inner.update_documents(&query, &update, options).await })
            .await
    }

    /// Removes the first match, or every match with `multi`. Returns the
    /// number of documents removed.
    pub async fn remove(&self, query: Value, options: RemoveOptions) -> DatastoreResult<usize> {
        self.run(move |inner| async move { inner.remove_documents(&query, options).await })
            .await
    }

    /// Creates an index and seeds it with the current documents. An index
    /// already present on the field is left as is.
    pub async fn ensure_index(&self, options: IndexOptions) -> DatastoreResult<()> {
        if options.field_name.is_empty() {
            return Err(DatastoreError::invalid_argument(
                "Cannot create an index without a fieldName",
            ));
        }
        self.run(move |inner| async move { inner.create_index(options).await })
            .await
    }

    /// Drops the index on a field; `_id` cannot be dropped
    pub async fn remove_index(&self, field_name: &str) -> DatastoreResult<()> {
        if field_name == ID_FIELD {
            return Err(DatastoreError::invalid_argument("The _id index cannot be removed"));
        }
        let field_name = field_name.to_string();
        self.run(move |inner| async move { inner.drop_index(&field_name).await })
            .await
    }

    /// Rewrites the datafile as one line per live document
    pub async fn compact_datafile(&self) -> DatastoreResult<()> {
        self.run(|inner| async move { inner.compact().await }).await
    }

    /// Compacts the datafile on a fixed interval until stopped or until the
    /// store is dropped. Replaces any running schedule. Fails with
    /// `NoRuntime` outside a tokio runtime.
    pub fn set_autocompaction_interval(&self, interval: Duration) -> DatastoreResult<()> {
        let runtime = Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?;
        let weak = Arc::downgrade(&self.inner);
        let handle = Autocompaction::spawn(&runtime, interval, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                if !inner.executor.is_ready() {
                    return true;
                }
                let store = Datastore { inner };
                if let Err(e) = store.compact_datafile().await {
                    tracing::warn!(code = e.code(), error = %e, "autocompaction failed");
                    return !e.is_fatal();
                }
                true
            }
        });

        tracing::debug!(period_ms = handle.period().as_millis() as u64, "autocompaction scheduled");
        if let Some(previous) = self.inner.autocompaction.lock().replace(handle) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_autocompaction(&self) {
        if let Some(handle) = self.inner.autocompaction.lock().take() {
            handle.stop();
        }
    }

    /// Copies of every document, in `_id` order
    pub fn get_all_data(&self) -> Vec<Value> {
        self.inner
            .state
            .lock()
            .all_documents()
            .iter()
            .map(|doc| deep_copy(doc, false))
            .collect()
    }

    /// Indexed field names, `_id` included
    pub fn index_names(&self) -> Vec<String> {
        self.inner.state.lock().index_names()
    }

    /// Documents an index lookup would consider for the query, before full
    /// matching. Expired documents are removed and never returned unless
    /// `dont_expire` is set.
    pub async fn get_candidates(&self, query: Value, dont_expire: bool) -> DatastoreResult<Vec<Value>> {
        self.read(query, dont_expire, |_, candidates| {
            Ok(candidates.iter().map(|doc| deep_copy(doc, false)).collect())
        })
        .await
    }

    /// Runs the self-checks of every index tree
    pub fn check_index_consistency(&self) -> DatastoreResult<()> {
        Ok(self.inner.state.lock().check_consistency()?)
    }

    pub(crate) fn compare_strings(&self) -> Option<StringComparator> {
        self.inner.options.compare_strings.clone()
    }

    /// Fetches candidates for a query and hands them to `finish`.
    ///
    /// Before the store is ready the whole read is queued behind the load.
    /// Afterwards it runs directly and only the removal of expired
    /// documents goes through the queue.
    pub(crate) async fn read<F, T>(&self, query: Value, dont_expire: bool, finish: F) -> DatastoreResult<T>
    where
        F: FnOnce(&Query, Vec<Document>) -> DatastoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.inner.executor.is_ready() {
            return self
                .run(move |inner| async move {
                    let query = Query::parse(&query)?;
                    let candidates = inner.candidates_in_task(&query, dont_expire).await?;
                    finish(&query, candidates)
                })
                .await;
        }

        self.inner.ensure_loaded()?;
        let query = Query::parse(&query)?;
        let (live, expired) = self.inner.select_candidates(&query, dont_expire);
        if !expired.is_empty() {
            self.run(move |inner| async move { inner.remove_expired(expired).await })
                .await?;
        }
        finish(&query, live)
    }

    async fn run<F, Fut, T>(&self, task: F) -> DatastoreResult<T>
    where
        F: FnOnce(Arc<Inner>) -> Fut + Send + 'static,
        Fut: Future<Output = DatastoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .push(
                move || async move {
                    inner.ensure_loaded()?;
                    task(inner).await
                },
                false,
            )
            .await?
    }
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("filename", &self.inner.persistence.filename())
            .field("lifecycle", &*self.inner.lifecycle.lock())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn ensure_loaded(&self) -> DatastoreResult<()> {
        match &*self.lifecycle.lock() {
            Lifecycle::Failed(reason) => Err(DatastoreError::LoadFailed(reason.clone())),
            _ => Ok(()),
        }
    }

    async fn load_database(&self) -> DatastoreResult<()> {
        log_event(Event::LoadStart);

        match self.replay().await {
            Ok(count) => {
                *self.lifecycle.lock() = Lifecycle::Ready;
                self.executor.mark_ready();
                log_event_with_detail(Event::LoadComplete, format_args!("{} documents", count));
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = StoreState::new();
                *self.lifecycle.lock() = Lifecycle::Failed(e.to_string());
                self.executor.mark_ready();
                log_event_with_detail(Event::LoadFailed, &e);
                Err(e)
            }
        }
    }

    async fn replay(&self) -> DatastoreResult<usize> {
        let replayed = self.persistence.load_database().await?;
        let documents: Vec<Document> = replayed.documents.into_iter().map(Arc::new).collect();

        {
            let mut state = self.state.lock();
            state.recreate_indexes(replayed.indexes.into_values());
            state.reset_indexes(&documents)?;
        }

        self.compact().await?;
        Ok(documents.len())
    }

    async fn compact(&self) -> DatastoreResult<()> {
        let (documents, indexes) = {
            let state = self.state.lock();
            (state.all_documents(), state.index_options())
        };
        self.persistence
            .persist_cached_database(&documents, &indexes)
            .await?;
        Ok(())
    }

    fn select_candidates(&self, query: &Query, dont_expire: bool) -> (Vec<Document>, Vec<Document>) {
        let state = self.state.lock();
        let candidates = state.select_candidates(query);
        if dont_expire {
            return (candidates, Vec::new());
        }
        let now = chrono::Utc::now().timestamp_millis() as f64;
        state.partition_expired(candidates, now)
    }

    /// Candidate selection for code already running on the executor
    async fn candidates_in_task(&self, query: &Query, dont_expire: bool) -> DatastoreResult<Vec<Document>> {
        let (live, expired) = self.select_candidates(query, dont_expire);
        if !expired.is_empty() {
            self.remove_expired(expired).await?;
        }
        Ok(live)
    }

    async fn remove_expired(&self, expired: Vec<Document>) -> DatastoreResult<()> {
        let removed = {
            let mut state = self.state.lock();
            // another task may have replaced or removed them meanwhile
            let removed = state.still_indexed(expired);
            state.remove_from_indexes(&removed);
            removed
        };
        if removed.is_empty() {
            return Ok(());
        }

        self.persist_removals(&removed).await?;
        log_event_with_detail(Event::TtlEviction, format_args!("{} documents", removed.len()));
        Ok(())
    }

    fn prepare_document(&self, doc: &Value) -> DatastoreResult<Document> {
        let mut prepared = deep_copy(doc, false);
        let map = prepared
            .as_object_mut()
            .ok_or_else(|| ModelError::document("a document must be an object"))?;

        match map.get(ID_FIELD) {
            None => {
                map.insert(ID_FIELD.to_string(), Value::String(self.create_new_id()));
            }
            Some(Value::String(_)) => {}
            Some(_) => return Err(ModelError::document("_id must be a string").into()),
        }

        if self.options.timestamp_data {
            let now = now_date();
            if !map.contains_key("createdAt") {
                map.insert("createdAt".to_string(), now.clone());
            }
            if !map.contains_key("updatedAt") {
                map.insert("updatedAt".to_string(), now);
            }
        }

        check_object(&prepared)?;
        Ok(Arc::new(prepared))
    }

    fn create_new_id(&self) -> String {
        let state = self.state.lock();
        loop {
            let id = new_id();
            if !state.has_id(&id) {
                return id;
            }
        }
    }

    async fn insert_one(&self, doc: &Value) -> DatastoreResult<Value> {
        let prepared = self.prepare_document(doc)?;
        self.commit_inserts(std::slice::from_ref(&prepared)).await?;
        Ok(deep_copy(&prepared, false))
    }

    async fn insert_batch(&self, docs: &[Value]) -> DatastoreResult<Vec<Value>> {
        let prepared = docs
            .iter()
            .map(|doc| self.prepare_document(doc))
            .collect::<DatastoreResult<Vec<_>>>()?;
        self.commit_inserts(&prepared).await?;
        Ok(prepared.iter().map(|doc| deep_copy(doc, false)).collect())
    }

    async fn commit_inserts(&self, docs: &[Document]) -> DatastoreResult<()> {
        self.state.lock().add_to_indexes(docs)?;

        let entries: Vec<LogEntry> = docs.iter().cloned().map(LogEntry::Document).collect();
        if let Err(e) = self.persistence.persist_new_state(&entries).await {
            self.state.lock().remove_from_indexes(docs);
            return Err(e.into());
        }
        Ok(())
    }

    async fn persist_removals(&self, removed: &[Document]) -> DatastoreResult<()> {
        let entries: Vec<LogEntry> = removed
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).and_then(Value::as_str))
            .map(|id| LogEntry::Deleted { id: id.to_string() })
            .collect();

        if let Err(e) = self.persistence.persist_new_state(&entries).await {
            // the documents were indexed before this call
            let _ = self.state.lock().add_to_indexes(removed);
            return Err(e.into());
        }
        Ok(())
    }

    async fn update_documents(
        &self,
        query: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> DatastoreResult<UpdateOutcome> {
        let parsed = Query::parse(query)?;
        let mut matched: Vec<Document> = self
            .candidates_in_task(&parsed, false)
            .await?
            .into_iter()
            .filter(|doc| matches(doc, &parsed))
            .collect();
        if !options.multi {
            matched.truncate(1);
        }

        if matched.is_empty() && options.upsert {
            return self.upsert(query, update).await;
        }

        let now = self.options.timestamp_data.then(now_date);
        let pairs = matched
            .into_iter()
            .map(|old| {
                let mut new = modify(&old, update)?;
                if let (Some(now), Some(map)) = (&now, new.as_object_mut()) {
                    match old.get("createdAt") {
                        Some(created) => map.insert("createdAt".to_string(), created.clone()),
                        None => map.remove("createdAt"),
                    };
                    map.insert("updatedAt".to_string(), now.clone());
                }
                Ok((old, Arc::new(new)))
            })
            .collect::<DatastoreResult<Vec<(Document, Document)>>>()?;

        self.state.lock().update_indexes(&pairs)?;

        let entries: Vec<LogEntry> = pairs
            .iter()
            .map(|(_, new)| LogEntry::Document(Arc::clone(new)))
            .collect();
        if let Err(e) = self.persistence.persist_new_state(&entries).await {
            self.state.lock().revert_updates(&pairs);
            return Err(e.into());
        }

        let updated_docs = if options.return_updated_docs {
            pairs.iter().map(|(_, new)| deep_copy(new, false)).collect()
        } else {
            Vec::new()
        };

        Ok(UpdateOutcome {
            num_affected: pairs.len(),
            updated_docs,
            upserted: false,
        })
    }

    /// Inserts the update itself when it is a plain document, otherwise the
    /// query's plain fields with the update applied
    async fn upsert(&self, query: &Value, update: &Value) -> DatastoreResult<UpdateOutcome> {
        let to_insert = match check_object(update) {
            Ok(()) => update.clone(),
            Err(_) => modify(&deep_copy(query, true), update)?,
        };

        let prepared = self.prepare_document(&to_insert)?;
        self.commit_inserts(std::slice::from_ref(&prepared)).await?;

        Ok(UpdateOutcome {
            num_affected: 1,
            updated_docs: vec![deep_copy(&prepared, false)],
            upserted: true,
        })
    }

    async fn remove_documents(&self, query: &Value, options: RemoveOptions) -> DatastoreResult<usize> {
        let parsed = Query::parse(query)?;
        let mut removed: Vec<Document> = self
            .candidates_in_task(&parsed, true)
            .await?
            .into_iter()
            .filter(|doc| matches(doc, &parsed))
            .collect();
        if !options.multi {
            removed.truncate(1);
        }
        if removed.is_empty() {
            return Ok(0);
        }

        self.state.lock().remove_from_indexes(&removed);
        self.persist_removals(&removed).await?;
        Ok(removed.len())
    }

    async fn create_index(&self, options: IndexOptions) -> DatastoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.has_index(&options.field_name) {
                return Ok(());
            }
            state.create_index(options.clone())?;
        }

        let field_name = options.field_name.clone();
        if let Err(e) = self
            .persistence
            .persist_new_state(&[LogEntry::IndexCreated(options)])
            .await
        {
            self.state.lock().drop_index(&field_name);
            return Err(e.into());
        }

        log_event_with_detail(Event::IndexCreated, &field_name);
        Ok(())
    }

    async fn drop_index(&self, field_name: &str) -> DatastoreResult<()> {
        let dropped = self.state.lock().drop_index(field_name);
        if let Err(e) = self
            .persistence
            .persist_new_state(&[LogEntry::IndexRemoved(field_name.to_string())])
            .await
        {
            if let Some(options) = dropped {
                // same documents as before the drop, so reseeding cannot conflict
                if let Err(reseed) = self.state.lock().create_index(options) {
                    tracing::error!(field = field_name, error = %reseed, "failed to restore dropped index");
                }
            }
            return Err(e.into());
        }
        log_event_with_detail(Event::IndexRemoved, field_name);
        Ok(())
    }
}
