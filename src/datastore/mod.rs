//! Datastore subsystem for tidedb
//!
//! The public entry point: CRUD over documents, index management, loading
//! and compaction of the datafile.
//!
//! # Design Principles
//!
//! - Single writer: every mutation is a task on the executor
//! - All or nothing: a mutation changes every index or none of them
//! - Durable before acknowledged: a mutation whose log append fails is
//!   rolled back in memory
//!
//! # Invariants
//!
//! - The `_id` index always exists, is unique and holds every document
//! - A document object is shared by all indexes and never mutated in place
//! - Expired TTL documents are never returned by a query

mod datastore;
mod errors;
mod options;
mod state;

pub use datastore::Datastore;
pub use errors::{DatastoreError, DatastoreResult};
pub use options::{DatastoreOptions, RemoveOptions, UpdateOptions, UpdateOutcome};
