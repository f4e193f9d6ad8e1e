//! Chainable query over a store

use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::pin::Pin;

use serde_json::Value;

use super::projection::Projection;
use super::sorter::{ResultSorter, SortSpec};
use crate::datastore::{Datastore, DatastoreResult};
use crate::model::{deep_copy, matches, Document};

/// What a cursor produces once its documents are selected
pub trait Terminal: Send + 'static {
    type Output: Send + 'static;

    /// Limit imposed by the terminal itself
    fn limit(requested: Option<usize>) -> Option<usize> {
        requested
    }

    fn finish(docs: Vec<Document>, projection: Option<&Projection>) -> DatastoreResult<Self::Output>;
}

/// Every match, as copies
pub struct Find;

/// The first match
pub struct FindOne;

/// Number of matches
pub struct Count;

fn project(doc: &Document, projection: Option<&Projection>) -> DatastoreResult<Value> {
    match projection {
        Some(projection) => projection.apply(doc),
        None => Ok(deep_copy(doc, false)),
    }
}

impl Terminal for Find {
    type Output = Vec<Value>;

    fn finish(docs: Vec<Document>, projection: Option<&Projection>) -> DatastoreResult<Vec<Value>> {
        docs.iter().map(|doc| project(doc, projection)).collect()
    }
}

impl Terminal for FindOne {
    type Output = Option<Value>;

    fn limit(_requested: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn finish(docs: Vec<Document>, projection: Option<&Projection>) -> DatastoreResult<Option<Value>> {
        docs.first().map(|doc| project(doc, projection)).transpose()
    }
}

impl Terminal for Count {
    type Output = usize;

    fn finish(docs: Vec<Document>, _projection: Option<&Projection>) -> DatastoreResult<usize> {
        Ok(docs.len())
    }
}

/// Lazy query: nothing runs until `exec` or `.await`.
///
/// A cursor can be executed again and always reads the current state.
pub struct Cursor<T: Terminal> {
    store: Datastore,
    query: Value,
    sort: SortSpec,
    skip: usize,
    limit: Option<usize>,
    projection: Option<Value>,
    terminal: PhantomData<fn() -> T>,
}

impl<T: Terminal> Cursor<T> {
    pub(crate) fn new(store: Datastore, query: Value) -> Self {
        Self {
            store,
            query,
            sort: SortSpec::default(),
            skip: 0,
            limit: None,
            projection: None,
            terminal: PhantomData,
        }
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `{"field": 1}` keeps fields, `{"field": 0}` drops them
    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Runs the query: candidates, match, sort, skip and limit, projection
    pub async fn exec(&self) -> DatastoreResult<T::Output> {
        let projection = match &self.projection {
            Some(value) => Projection::parse(value)?,
            None => None,
        };
        let sort = self.sort.clone();
        let skip = self.skip;
        let limit = T::limit(self.limit);
        let compare_strings = self.store.compare_strings();

        self.store
            .read(self.query.clone(), false, move |query, candidates| {
                let mut matched: Vec<Document> = candidates
                    .into_iter()
                    .filter(|doc| matches(doc, query))
                    .collect();
                ResultSorter::sort(&mut matched, &sort, compare_strings.as_ref());

                let window: Vec<Document> = matched
                    .into_iter()
                    .skip(skip)
                    .take(limit.unwrap_or(usize::MAX))
                    .collect();
                T::finish(window, projection.as_ref())
            })
            .await
    }
}

impl<T: Terminal> IntoFuture for Cursor<T> {
    type Output = DatastoreResult<T::Output>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.exec().await })
    }
}
