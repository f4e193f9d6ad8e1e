//! Document validation and copying
//!
//! Field names starting with `$` belong to the query and update languages,
//! and `.` is the path separator, so neither may appear in a stored key.
//! The log encodings (`$$date`, `$$deleted`, `$$indexCreated`,
//! `$$indexRemoved`) are the only exceptions.

use serde_json::{Map, Value};

use super::errors::{ModelError, ModelResult};
use super::value::DATE_KEY;

fn check_key(key: &str, value: &Value) -> ModelResult<()> {
    if key.starts_with('$') {
        let reserved = (key == DATE_KEY && value.is_number())
            || (key == "$$deleted" && value == &Value::Bool(true))
            || key == "$$indexCreated"
            || key == "$$indexRemoved";
        if !reserved {
            return Err(ModelError::document(format!(
                "Field names cannot begin with the $ character: {}",
                key
            )));
        }
    }

    if key.contains('.') {
        return Err(ModelError::document(format!(
            "Field names cannot contain a '.': {}",
            key
        )));
    }

    Ok(())
}

/// Recursively checks every key of a value
pub fn check_object(value: &Value) -> ModelResult<()> {
    match value {
        Value::Array(items) => items.iter().try_for_each(check_object),
        Value::Object(map) => map.iter().try_for_each(|(key, inner)| {
            check_key(key, inner)?;
            check_object(inner)
        }),
        _ => Ok(()),
    }
}

/// Deep copy. With `strict_keys`, keys starting with `$` or containing a
/// `.` are dropped; this turns a query into the base of an upserted document.
pub fn deep_copy(value: &Value, strict_keys: bool) -> Value {
    if !strict_keys {
        return value.clone();
    }

    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| deep_copy(v, true)).collect()),
        Value::Object(map) => {
            let copied: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.contains('.'))
                .map(|(key, inner)| (key.clone(), deep_copy(inner, true)))
                .collect();
            Value::Object(copied)
        }
        other => other.clone(),
    }
}
