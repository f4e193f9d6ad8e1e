//! Datastore configuration and per-operation options
//!
//! `DatastoreOptions` deserializes from camelCase JSON so the CLI config file
//! and the persisted form share one shape. The serialization hook and the
//! string comparator are code, not configuration, and are attached with
//! builder methods.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{DatastoreError, DatastoreResult};
use crate::model::StringComparator;
use crate::persistence::SerializationHook;

/// Store configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreOptions {
    /// Datafile path; `None` keeps the store in memory
    #[serde(default)]
    pub filename: Option<PathBuf>,

    /// Ignore `filename` and never touch the disk
    #[serde(default)]
    pub in_memory_only: bool,

    /// Stamp `createdAt` and `updatedAt` on every document
    #[serde(default)]
    pub timestamp_data: bool,

    /// Share of corrupt datafile lines tolerated on load
    #[serde(default = "default_corrupt_alert_threshold")]
    pub corrupt_alert_threshold: f64,

    /// Compact the datafile on this interval once loaded
    #[serde(default)]
    pub autocompaction_interval_ms: Option<u64>,

    #[serde(skip)]
    pub serialization_hook: Option<Arc<dyn SerializationHook>>,

    #[serde(skip)]
    pub compare_strings: Option<StringComparator>,
}

fn default_corrupt_alert_threshold() -> f64 {
    0.1
}

impl Default for DatastoreOptions {
    fn default() -> Self {
        Self {
            filename: None,
            in_memory_only: false,
            timestamp_data: false,
            corrupt_alert_threshold: default_corrupt_alert_threshold(),
            autocompaction_interval_ms: None,
            serialization_hook: None,
            compare_strings: None,
        }
    }
}

impl DatastoreOptions {
    /// In-memory store
    pub fn in_memory() -> Self {
        Self {
            in_memory_only: true,
            ..Self::default()
        }
    }

    /// Durable store backed by a datafile
    pub fn persistent(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    pub fn timestamp_data(mut self, enabled: bool) -> Self {
        self.timestamp_data = enabled;
        self
    }

    pub fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.corrupt_alert_threshold = threshold;
        self
    }

    pub fn autocompaction_interval_ms(mut self, interval_ms: u64) -> Self {
        self.autocompaction_interval_ms = Some(interval_ms);
        self
    }

    pub fn serialization_hook(mut self, hook: Arc<dyn SerializationHook>) -> Self {
        self.serialization_hook = Some(hook);
        self
    }

    /// Custom string ordering used when sorting cursor results
    pub fn compare_strings(mut self, compare: StringComparator) -> Self {
        self.compare_strings = Some(compare);
        self
    }

    /// The datafile path, unless the store is in memory
    pub fn datafile(&self) -> Option<&Path> {
        if self.in_memory_only {
            None
        } else {
            self.filename.as_deref()
        }
    }

    /// Loads options from a JSON config file
    pub fn load(path: &Path) -> DatastoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DatastoreError::invalid_argument(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;

        let options: DatastoreOptions = serde_json::from_str(&content)
            .map_err(|e| DatastoreError::invalid_argument(format!("Invalid config JSON: {}", e)))?;

        options.validate()?;
        Ok(options)
    }

    /// Checks value ranges
    pub fn validate(&self) -> DatastoreResult<()> {
        if !(0.0..=1.0).contains(&self.corrupt_alert_threshold) {
            return Err(DatastoreError::invalid_argument(format!(
                "corruptAlertThreshold must be within [0, 1], got {}",
                self.corrupt_alert_threshold
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for DatastoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreOptions")
            .field("filename", &self.filename)
            .field("in_memory_only", &self.in_memory_only)
            .field("timestamp_data", &self.timestamp_data)
            .field("corrupt_alert_threshold", &self.corrupt_alert_threshold)
            .field("autocompaction_interval_ms", &self.autocompaction_interval_ms)
            .field("serialization_hook", &self.serialization_hook.is_some())
            .field("compare_strings", &self.compare_strings.is_some())
            .finish()
    }
}

/// Options of `Datastore::update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    /// Update every match instead of the first
    #[serde(default)]
    pub multi: bool,
    /// Insert a document when nothing matches
    #[serde(default)]
    pub upsert: bool,
    /// Return the updated documents
    #[serde(default)]
    pub return_updated_docs: bool,
}

impl UpdateOptions {
    pub fn multi() -> Self {
        Self {
            multi: true,
            ..Self::default()
        }
    }

    pub fn upsert() -> Self {
        Self {
            upsert: true,
            ..Self::default()
        }
    }

    pub fn returning(mut self) -> Self {
        self.return_updated_docs = true;
        self
    }
}

/// Result of `Datastore::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matched and modified, or 1 for an upsert
    pub num_affected: usize,
    /// Copies of the modified documents when requested; the upserted
    /// document is always returned
    pub updated_docs: Vec<Value>,
    /// True when the update inserted a document
    pub upserted: bool,
}

/// Options of `Datastore::remove`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RemoveOptions {
    /// Remove every match instead of the first
    #[serde(default)]
    pub multi: bool,
}

impl RemoveOptions {
    pub fn multi() -> Self {
        Self { multi: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_json() {
        let options: DatastoreOptions = serde_json::from_str(r#"{"filename": "db/data.ndjson"}"#).unwrap();
        assert_eq!(options.datafile(), Some(Path::new("db/data.ndjson")));
        assert!(!options.timestamp_data);
        assert_eq!(options.corrupt_alert_threshold, 0.1);
        assert_eq!(options.autocompaction_interval_ms, None);
    }

    #[test]
    fn test_in_memory_only_overrides_filename() {
        let options: DatastoreOptions =
            serde_json::from_str(r#"{"filename": "x.db", "inMemoryOnly": true}"#).unwrap();
        assert_eq!(options.datafile(), None);
    }

    #[test]
    fn test_load_validates_threshold() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"corruptAlertThreshold": 1.5}}"#).unwrap();
        let err = DatastoreOptions::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "TIDE_INVALID_ARGUMENT");
    }

    #[test]
    fn test_load_reads_camel_case() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"filename": "a.db", "timestampData": true, "autocompactionIntervalMs": 60000}}"#
        )
        .unwrap();
        let options = DatastoreOptions::load(file.path()).unwrap();
        assert!(options.timestamp_data);
        assert_eq!(options.autocompaction_interval_ms, Some(60000));
    }

    #[test]
    fn test_update_options_from_json() {
        let options: UpdateOptions = serde_json::from_str(r#"{"multi": true, "upsert": true}"#).unwrap();
        assert!(options.multi && options.upsert && !options.return_updated_docs);
    }
}
