//! Observable events in tidedb
//!
//! Events are explicit and typed. Each maps to a stable string name that
//! appears as the `event` field of the emitted log record.

use std::fmt;

/// Severity attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Load lifecycle
    /// Datafile load begins
    LoadStart,
    /// Datafile replayed and indexes rebuilt
    LoadComplete,
    /// Corrupt lines exceeded the alert threshold
    LoadCorruption,
    /// Load failed; the store rejects further work
    LoadFailed,

    // Persistence
    /// Append to the datafile failed
    PersistFailed,
    /// Datafile rewritten
    CompactionDone,

    // Documents
    /// Expired documents removed by a TTL index
    TtlEviction,

    // Indexes
    /// Index created
    IndexCreated,
    /// Index removed
    IndexRemoved,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::LoadStart => "LOAD_BEGIN",
            Event::LoadComplete => "LOAD_COMPLETE",
            Event::LoadCorruption => "LOAD_CORRUPTION",
            Event::LoadFailed => "LOAD_FAILED",
            Event::PersistFailed => "PERSIST_FAILED",
            Event::CompactionDone => "COMPACTION_DONE",
            Event::TtlEviction => "TTL_EVICTION",
            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexRemoved => "INDEX_REMOVED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::LoadCorruption | Event::LoadFailed | Event::PersistFailed => Severity::Error,
            Event::TtlEviction | Event::CompactionDone => Severity::Debug,
            Event::LoadStart | Event::LoadComplete | Event::IndexCreated | Event::IndexRemoved => {
                Severity::Info
            }
        }
    }

    /// Returns true if the store cannot continue after this event
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::LoadCorruption | Event::LoadFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
