//! tidedb - An embedded document store
//!
//! Documents are JSON objects held in memory, indexed by ordered trees and
//! made durable by an append-only NDJSON datafile.
//!
//! ```ignore
//! use serde_json::json;
//! use tidedb::{Datastore, DatastoreOptions, SortSpec};
//!
//! let store = Datastore::new(DatastoreOptions::persistent("data/users.db"))?;
//! store.load().await?;
//! store.insert(json!({"name": "ada", "age": 36})).await?;
//! let adults = store
//!     .find(json!({"age": {"$gte": 18}}))
//!     .sort(SortSpec::asc("name"))
//!     .await?;
//! ```

pub mod cli;
pub mod cursor;
pub mod datastore;
pub mod executor;
pub mod id;
pub mod index;
pub mod model;
pub mod observability;
pub mod persistence;

pub use cursor::{Cursor, SortSpec};
pub use datastore::{
    Datastore, DatastoreError, DatastoreOptions, DatastoreResult, RemoveOptions, UpdateOptions,
    UpdateOutcome,
};
pub use index::IndexOptions;
pub use persistence::SerializationHook;
