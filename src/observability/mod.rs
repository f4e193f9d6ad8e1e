//! Observability subsystem for tidedb
//!
//! Lifecycle events are emitted as `tracing` records with a stable `event`
//! field. The library never installs a subscriber; the binary does.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. One record per event
//!
//! # Usage
//!
//! ```ignore
//! use tidedb::observability::{log_event, log_event_with_detail, Event};
//!
//! log_event(Event::LoadStart);
//! log_event_with_detail(Event::PersistFailed, "disk full");
//! ```

mod events;

pub use events::{Event, Severity};

use std::fmt::Display;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    match event.severity() {
        Severity::Debug => tracing::debug!(event = event.as_str()),
        Severity::Info => tracing::info!(event = event.as_str()),
        Severity::Warn => tracing::warn!(event = event.as_str()),
        Severity::Error => tracing::error!(event = event.as_str(), fatal = event.is_fatal()),
    }
}

/// Log a lifecycle event with a human-readable detail
pub fn log_event_with_detail(event: Event, detail: impl Display) {
    match event.severity() {
        Severity::Debug => tracing::debug!(event = event.as_str(), "{}", detail),
        Severity::Info => tracing::info!(event = event.as_str(), "{}", detail),
        Severity::Warn => tracing::warn!(event = event.as_str(), "{}", detail),
        Severity::Error => {
            tracing::error!(event = event.as_str(), fatal = event.is_fatal(), "{}", detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // no subscriber installed; verifies no panic
        log_event(Event::LoadStart);
        log_event(Event::LoadFailed);
    }

    #[test]
    fn test_log_event_with_detail() {
        log_event_with_detail(Event::TtlEviction, format_args!("{} documents", 3));
        log_event_with_detail(Event::PersistFailed, "disk full");
    }
}
