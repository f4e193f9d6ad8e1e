//! Log entries and replay
//!
//! The datafile is newline-delimited JSON. Each line is a full document, a
//! deletion marker `{"$$deleted": true, "_id": ...}`, or an index directive
//! (`$$indexCreated`, `$$indexRemoved`). Replay walks the lines in order and
//! later lines win.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};

use super::errors::{PersistenceError, PersistenceResult};
use super::hooks::SerializationHook;
use crate::index::IndexOptions;
use crate::model::Document;

/// One line of the datafile
#[derive(Debug, Clone)]
pub enum LogEntry {
    /// Current state of a document
    Document(Document),
    /// Document removed
    Deleted { id: String },
    /// Index created with these options
    IndexCreated(IndexOptions),
    /// Index on this field removed
    IndexRemoved(String),
}

impl LogEntry {
    /// JSON form of the entry
    pub fn to_value(&self) -> Value {
        match self {
            LogEntry::Document(doc) => Value::clone(doc),
            LogEntry::Deleted { id } => json!({ "$$deleted": true, "_id": id }),
            LogEntry::IndexCreated(options) => json!({ "$$indexCreated": options }),
            LogEntry::IndexRemoved(field) => json!({ "$$indexRemoved": field }),
        }
    }
}

/// Result of replaying a datafile
#[derive(Debug, Default)]
pub struct ReplayedState {
    /// Live documents, unordered
    pub documents: Vec<Value>,
    /// Live index definitions by field name
    pub indexes: BTreeMap<String, IndexOptions>,
    /// Non-empty lines that could not be decoded
    pub corrupt_lines: usize,
    /// Non-empty lines read
    pub total_lines: usize,
}

enum Line {
    Upsert(String, Value),
    Delete(String),
    IndexCreated(IndexOptions),
    IndexRemoved(String),
    Ignored,
}

fn decode_line(line: &str) -> Option<Line> {
    let value: Value = serde_json::from_str(line).ok()?;
    let map = value.as_object()?;

    if let Some(id) = map.get("_id") {
        let id = id.as_str()?.to_string();
        if map.get("$$deleted") == Some(&Value::Bool(true)) {
            return Some(Line::Delete(id));
        }
        return Some(Line::Upsert(id, value));
    }

    if let Some(created) = map.get("$$indexCreated") {
        let options: IndexOptions = serde_json::from_value(created.clone()).ok()?;
        if options.field_name.is_empty() {
            return Some(Line::Ignored);
        }
        return Some(Line::IndexCreated(options));
    }

    if let Some(Value::String(field)) = map.get("$$indexRemoved") {
        return Some(Line::IndexRemoved(field.clone()));
    }

    Some(Line::Ignored)
}

/// Replays raw datafile contents.
///
/// Empty lines are skipped. Fails with a corruption error when the share of
/// undecodable lines exceeds `corrupt_alert_threshold`.
pub fn treat_raw_data(
    raw: &str,
    hook: Option<&dyn SerializationHook>,
    corrupt_alert_threshold: f64,
) -> PersistenceResult<ReplayedState> {
    let mut by_id: HashMap<String, Value> = HashMap::new();
    let mut indexes = BTreeMap::new();
    let mut corrupt_lines = 0;
    let mut total_lines = 0;

    for raw_line in raw.split('\n') {
        if raw_line.is_empty() {
            continue;
        }
        total_lines += 1;

        let line = match hook {
            Some(hook) => hook.before_deserialization(raw_line.to_string()),
            None => raw_line.to_string(),
        };

        match decode_line(&line) {
            Some(Line::Upsert(id, doc)) => {
                by_id.insert(id, doc);
            }
            Some(Line::Delete(id)) => {
                by_id.remove(&id);
            }
            Some(Line::IndexCreated(options)) => {
                indexes.insert(options.field_name.clone(), options);
            }
            Some(Line::IndexRemoved(field)) => {
                indexes.remove(&field);
            }
            Some(Line::Ignored) => {}
            None => corrupt_lines += 1,
        }
    }

    if total_lines > 0 && corrupt_lines as f64 / total_lines as f64 > corrupt_alert_threshold {
        return Err(PersistenceError::corruption(
            corrupt_lines,
            total_lines,
            corrupt_alert_threshold,
        ));
    }

    Ok(ReplayedState {
        documents: by_id.into_values().collect(),
        indexes,
        corrupt_lines,
        total_lines,
    })
}
