//! Durable log for one store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::errors::{PersistenceError, PersistenceResult};
use super::hooks::{verify_hook, SerializationHook};
use super::log::{treat_raw_data, LogEntry, ReplayedState};
use super::storage;
use crate::index::IndexOptions;
use crate::model::Document;
use crate::observability::{log_event, log_event_with_detail, Event};

/// Append-only NDJSON log. A store without a filename is in-memory only and
/// every write is a no-op.
pub struct Persistence {
    filename: Option<PathBuf>,
    hook: Option<Arc<dyn SerializationHook>>,
    corrupt_alert_threshold: f64,
}

impl Persistence {
    /// Validates the filename and the hook pair
    pub fn new(
        filename: Option<PathBuf>,
        hook: Option<Arc<dyn SerializationHook>>,
        corrupt_alert_threshold: f64,
    ) -> PersistenceResult<Self> {
        if let Some(path) = &filename {
            if path.as_os_str().to_string_lossy().ends_with('~') {
                return Err(PersistenceError::invalid_filename(path));
            }
        }
        if let Some(hook) = &hook {
            verify_hook(hook.as_ref())?;
        }

        Ok(Self {
            filename,
            hook,
            corrupt_alert_threshold,
        })
    }

    /// Returns the datafile path, `None` for in-memory stores
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.filename.is_none()
    }

    fn serialize(&self, value: &Value) -> PersistenceResult<String> {
        let line = serde_json::to_string(value)
            .map_err(|e| PersistenceError::write_failed_msg(format!("Failed to encode entry: {}", e)))?;
        Ok(match &self.hook {
            Some(hook) => hook.after_serialization(line),
            None => line,
        })
    }

    fn encode_lines(&self, values: impl Iterator<Item = Value>) -> PersistenceResult<String> {
        let mut out = String::new();
        for value in values {
            out.push_str(&self.serialize(&value)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Reads and replays the datafile, recovering from an interrupted
    /// compaction first
    pub async fn load_database(&self) -> PersistenceResult<ReplayedState> {
        let Some(path) = &self.filename else {
            return Ok(ReplayedState::default());
        };

        storage::ensure_parent_dir(path).await?;
        storage::ensure_datafile_integrity(path).await?;
        let raw = storage::read_datafile(path).await?;

        let state = treat_raw_data(&raw, self.hook.as_deref(), self.corrupt_alert_threshold)
            .map_err(|e| {
                log_event_with_detail(Event::LoadCorruption, e.message());
                e
            })?;

        if state.corrupt_lines > 0 {
            tracing::warn!(
                path = %path.display(),
                corrupt = state.corrupt_lines,
                total = state.total_lines,
                "dropped corrupt datafile lines"
            );
        }

        Ok(state)
    }

    /// Appends entries to the datafile in one write
    pub async fn persist_new_state(&self, entries: &[LogEntry]) -> PersistenceResult<()> {
        let Some(path) = &self.filename else {
            return Ok(());
        };
        if entries.is_empty() {
            return Ok(());
        }

        let contents = self.encode_lines(entries.iter().map(LogEntry::to_value))?;
        storage::append(path, &contents).await.map_err(|e| {
            log_event_with_detail(Event::PersistFailed, e.message());
            e
        })
    }

    /// Rewrites the datafile as one line per document followed by one
    /// `$$indexCreated` line per secondary index
    pub async fn persist_cached_database(
        &self,
        documents: &[Document],
        indexes: &[IndexOptions],
    ) -> PersistenceResult<()> {
        let Some(path) = &self.filename else {
            return Ok(());
        };

        let entries = documents
            .iter()
            .map(|doc| LogEntry::Document(Arc::clone(doc)))
            .chain(
                indexes
                    .iter()
                    .filter(|options| options.field_name != "_id")
                    .cloned()
                    .map(LogEntry::IndexCreated),
            )
            .map(|entry| entry.to_value());
        let contents = self.encode_lines(entries)?;

        storage::crash_safe_write(path, &contents).await?;
        log_event(Event::CompactionDone);
        Ok(())
    }
}
