//! Field projection
//!
//! A projection either picks fields (`{"a": 1, "b.c": 1}`) or omits them
//! (`{"a": 0}`); the two modes cannot be mixed. `_id` is exempt from the mode
//! rule and is kept unless it is explicitly set to 0.

use serde_json::{Map, Value};

use crate::datastore::{DatastoreError, DatastoreResult};
use crate::model::{deep_copy, get_dot_value, set_dot_value, unset_dot_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pick,
    Omit,
}

/// Parsed projection
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    mode: Mode,
    fields: Vec<String>,
    keep_id: bool,
}

impl Projection {
    /// Parses a projection object. `None` means documents pass through
    /// untouched.
    pub fn parse(value: &Value) -> DatastoreResult<Option<Projection>> {
        let map = match value {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(map) => map,
            _ => return Err(DatastoreError::invalid_argument("projection must be an object")),
        };

        let mut keep_id = true;
        let mut mode = None;
        let mut fields = Vec::new();

        for (field, flag) in map {
            let include = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) if n.as_f64() == Some(1.0) => true,
                Value::Number(n) if n.as_f64() == Some(0.0) => false,
                _ => {
                    return Err(DatastoreError::invalid_argument(format!(
                        "projection value for {} must be 0 or 1",
                        field
                    )))
                }
            };

            if field == "_id" {
                keep_id = include;
                continue;
            }

            let field_mode = if include { Mode::Pick } else { Mode::Omit };
            match mode {
                Some(m) if m != field_mode => {
                    return Err(DatastoreError::invalid_argument(
                        "Can't both keep and omit fields except for _id",
                    ))
                }
                _ => mode = Some(field_mode),
            }
            fields.push(field.clone());
        }

        // only `_id` given: nothing to pick, so everything else is kept
        Ok(Some(Projection {
            mode: mode.unwrap_or(Mode::Omit),
            fields,
            keep_id,
        }))
    }

    /// Projects a copy of the document
    pub fn apply(&self, doc: &Value) -> DatastoreResult<Value> {
        let mut out = match self.mode {
            Mode::Pick => {
                let mut out = Value::Object(Map::new());
                for field in &self.fields {
                    if let Some(value) = get_dot_value(doc, field) {
                        set_dot_value(&mut out, field, deep_copy(&value, false))?;
                    }
                }
                out
            }
            Mode::Omit => {
                let mut out = deep_copy(doc, false);
                for field in &self.fields {
                    unset_dot_value(&mut out, field)?;
                }
                out
            }
        };

        if let Value::Object(map) = &mut out {
            match doc.get("_id") {
                Some(id) if self.keep_id => {
                    map.insert("_id".to_string(), id.clone());
                }
                _ => {
                    map.remove("_id");
                }
            }
        }
        Ok(out)
    }
}
