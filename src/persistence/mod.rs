//! Persistence subsystem for tidedb
//!
//! The datafile is an append-only NDJSON log. Mutations append their change
//! set; loading replays the whole file; compaction rewrites it to one line
//! per live document plus the index directives.
//!
//! # Design Principles
//!
//! - Append-only: existing bytes are never modified in place
//! - Crash-safe rewrite: temp file, fsync, rename, directory fsync
//! - Bounded tolerance: a corrupt tail is dropped only below a threshold
//!
//! # Invariants
//!
//! - Replaying the file yields the state the store last acknowledged
//! - An in-memory store never touches the file system

mod autocompaction;
mod errors;
mod hooks;
mod log;
mod persistence;
mod storage;

pub use autocompaction::{Autocompaction, MIN_AUTOCOMPACTION_INTERVAL};
pub use errors::{PersistenceError, PersistenceErrorCode, PersistenceResult, Severity};
pub use hooks::{verify_hook, SerializationHook};
pub use log::{treat_raw_data, LogEntry, ReplayedState};
pub use persistence::Persistence;
pub use storage::temp_path;
