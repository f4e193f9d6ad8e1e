//! Update operators
//!
//! An update object either has no `$` keys, in which case it replaces the
//! document (keeping its `_id`), or has only `$` keys, each naming a
//! modifier applied to a set of dotted paths.
//!
//! # Invariants
//!
//! - The input document is never mutated; a modified copy is returned
//! - The result passes `check_object`
//! - `_id` never changes

use serde_json::{Map, Number, Value};

use super::errors::{ModelError, ModelResult};
use super::matcher::matches_value;
use super::validate::{check_object, deep_copy};
use super::value::compare_things;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Set,
    Unset,
    Inc,
    Push,
    AddToSet,
    Pop,
    Pull,
    Max,
    Min,
}

impl Modifier {
    fn from_name(name: &str) -> ModelResult<Self> {
        Ok(match name {
            "$set" => Modifier::Set,
            "$unset" => Modifier::Unset,
            "$inc" => Modifier::Inc,
            "$push" => Modifier::Push,
            "$addToSet" => Modifier::AddToSet,
            "$pop" => Modifier::Pop,
            "$pull" => Modifier::Pull,
            "$max" => Modifier::Max,
            "$min" => Modifier::Min,
            other => return Err(ModelError::update(format!("Unknown modifier {}", other))),
        })
    }

    fn name(self) -> &'static str {
        match self {
            Modifier::Set => "$set",
            Modifier::Unset => "$unset",
            Modifier::Inc => "$inc",
            Modifier::Push => "$push",
            Modifier::AddToSet => "$addToSet",
            Modifier::Pop => "$pop",
            Modifier::Pull => "$pull",
            Modifier::Max => "$max",
            Modifier::Min => "$min",
        }
    }

    /// Computes the new value of a field from its current value.
    /// `None` in and out means the field is absent.
    fn apply(self, current: Option<Value>, arg: &Value) -> ModelResult<Option<Value>> {
        match self {
            Modifier::Set => Ok(Some(arg.clone())),
            Modifier::Unset => Ok(None),
            Modifier::Inc => inc(current, arg).map(Some),
            Modifier::Push => push(current, arg).map(Some),
            Modifier::AddToSet => add_to_set(current, arg).map(Some),
            Modifier::Pop => pop(current, arg).map(Some),
            Modifier::Pull => pull(current, arg).map(Some),
            Modifier::Max => Ok(Some(extremum(current, arg, std::cmp::Ordering::Greater))),
            Modifier::Min => Ok(Some(extremum(current, arg, std::cmp::Ordering::Less))),
        }
    }
}

/// Applies an update object to a document and returns the new document
pub fn modify(doc: &Value, update: &Value) -> ModelResult<Value> {
    let update_map = update
        .as_object()
        .ok_or_else(|| ModelError::update("an update must be an object"))?;

    if let Some(new_id) = update_map.get("_id") {
        if doc.get("_id") != Some(new_id) {
            return Err(ModelError::update("You cannot change a document's _id"));
        }
    }

    let dollar = update_map.keys().filter(|k| k.starts_with('$')).count();
    if dollar != 0 && dollar != update_map.len() {
        return Err(ModelError::update("You cannot mix modifiers and normal fields"));
    }

    let new_doc = if dollar == 0 {
        let mut replacement = deep_copy(update, false);
        if let (Value::Object(map), Some(id)) = (&mut replacement, doc.get("_id")) {
            map.insert("_id".to_string(), id.clone());
        }
        replacement
    } else {
        let mut copy = deep_copy(doc, false);
        for (name, fields) in update_map {
            let modifier = Modifier::from_name(name)?;
            let fields = fields.as_object().ok_or_else(|| {
                ModelError::update(format!("Modifier {}'s argument must be an object", name))
            })?;
            for (path, arg) in fields {
                apply_at_path(&mut copy, modifier, path, arg)?;
            }
        }
        copy
    };

    check_object(&new_doc)?;

    if doc.get("_id") != new_doc.get("_id") {
        return Err(ModelError::update("You can't change a document's _id"));
    }

    Ok(new_doc)
}

/// Sets a dotted path, creating intermediate objects
pub fn set_dot_value(doc: &mut Value, path: &str, value: Value) -> ModelResult<()> {
    apply_at_path(doc, Modifier::Set, path, &value)
}

/// Removes a dotted path; absent paths are ignored
pub fn unset_dot_value(doc: &mut Value, path: &str) -> ModelResult<()> {
    apply_at_path(doc, Modifier::Unset, path, &Value::Bool(true))
}

fn apply_at_path(target: &mut Value, modifier: Modifier, path: &str, arg: &Value) -> ModelResult<()> {
    let parts: Vec<&str> = path.split('.').collect();
    apply_at_parts(target, modifier, &parts, arg)
}

fn apply_at_parts(
    target: &mut Value,
    modifier: Modifier,
    parts: &[&str],
    arg: &Value,
) -> ModelResult<()> {
    let Some((first, rest)) = parts.split_first() else {
        return Ok(());
    };

    if rest.is_empty() {
        return apply_last(target, modifier, first, arg);
    }

    let next = match target {
        Value::Object(map) => {
            if !map.contains_key(*first) {
                if modifier == Modifier::Unset {
                    return Ok(());
                }
                map.insert(first.to_string(), Value::Object(Map::new()));
            }
            map.get_mut(*first)
        }
        Value::Array(items) => first.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    };

    match next {
        Some(next) => apply_at_parts(next, modifier, rest, arg),
        None if modifier == Modifier::Unset => Ok(()),
        None => Err(ModelError::update(format!(
            "{} cannot traverse into {} because it is not an object",
            modifier.name(),
            first
        ))),
    }
}

fn apply_last(container: &mut Value, modifier: Modifier, key: &str, arg: &Value) -> ModelResult<()> {
    match container {
        Value::Object(map) => {
            let current = map.remove(key);
            if let Some(next) = modifier.apply(current, arg)? {
                map.insert(key.to_string(), next);
            }
            Ok(())
        }
        Value::Array(items) => {
            let slot = key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| {
                    ModelError::update(format!("{} on a missing array index {}", modifier.name(), key))
                })?;
            let current = std::mem::take(slot);
            *slot = modifier.apply(Some(current), arg)?.unwrap_or(Value::Null);
            Ok(())
        }
        _ if modifier == Modifier::Unset => Ok(()),
        _ => Err(ModelError::update(format!(
            "{} cannot set field {} on a non-object value",
            modifier.name(),
            key
        ))),
    }
}

fn add_numbers(a: &Number, b: &Number) -> ModelResult<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(Value::from(sum));
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| ModelError::update("$inc produced a non-finite number"))
}

fn inc(current: Option<Value>, arg: &Value) -> ModelResult<Value> {
    let Value::Number(step) = arg else {
        return Err(ModelError::update(format!("{} must be a number", arg)));
    };
    match current {
        None => Ok(arg.clone()),
        Some(Value::Number(n)) => add_numbers(&n, step),
        Some(_) => Err(ModelError::update("Don't use the $inc modifier on non-number fields")),
    }
}

fn into_array(current: Option<Value>, modifier: Modifier) -> ModelResult<Vec<Value>> {
    match current {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ModelError::update(format!(
            "Can't {} an element on non-array values",
            modifier.name()
        ))),
    }
}

fn push(current: Option<Value>, arg: &Value) -> ModelResult<Value> {
    let mut items = into_array(current, Modifier::Push)?;

    let spec = match arg {
        Value::Object(map) if map.contains_key("$each") || map.contains_key("$slice") => map,
        _ => {
            items.push(arg.clone());
            return Ok(Value::Array(items));
        }
    };

    if spec.keys().any(|k| k != "$each" && k != "$slice") {
        return Err(ModelError::update(
            "Can only use $slice in conjunction with $each when $push to array",
        ));
    }

    match spec.get("$each") {
        None => {}
        Some(Value::Array(each)) => items.extend(each.iter().cloned()),
        Some(_) => return Err(ModelError::update("$each requires an array value")),
    }

    if let Some(slice) = spec.get("$slice") {
        let slice = slice
            .as_i64()
            .ok_or_else(|| ModelError::update("$slice requires an integer value"))?;
        let len = items.len() as i64;
        let (start, end) = if slice >= 0 {
            (0, slice.min(len))
        } else {
            ((len + slice).max(0), len)
        };
        items = items.drain(start as usize..end as usize).collect();
    }

    Ok(Value::Array(items))
}

fn add_to_set(current: Option<Value>, arg: &Value) -> ModelResult<Value> {
    let mut items = into_array(current, Modifier::AddToSet)?;

    let additions: Vec<&Value> = match arg {
        Value::Object(map) if map.contains_key("$each") => {
            if map.len() > 1 {
                return Err(ModelError::update("Can't use another field in conjunction with $each"));
            }
            match map.get("$each") {
                Some(Value::Array(each)) => each.iter().collect(),
                _ => return Err(ModelError::update("$each requires an array value")),
            }
        }
        other => vec![other],
    };

    for value in additions {
        let present = items
            .iter()
            .any(|item| compare_things(Some(item), Some(value), None).is_eq());
        if !present {
            items.push(value.clone());
        }
    }

    Ok(Value::Array(items))
}

fn pop(current: Option<Value>, arg: &Value) -> ModelResult<Value> {
    let Some(Value::Array(mut items)) = current else {
        return Err(ModelError::update("Can't $pop an element from non-array values"));
    };
    let direction = arg
        .as_f64()
        .ok_or_else(|| ModelError::update(format!("{} isn't an integer, can't use it with $pop", arg)))?;

    if direction > 0.0 {
        items.pop();
    } else if direction < 0.0 && !items.is_empty() {
        items.remove(0);
    }
    Ok(Value::Array(items))
}

fn pull(current: Option<Value>, arg: &Value) -> ModelResult<Value> {
    let Some(Value::Array(items)) = current else {
        return Err(ModelError::update("Can't $pull an element from non-array values"));
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !matches_value(&item, arg)? {
            kept.push(item);
        }
    }
    Ok(Value::Array(kept))
}

fn extremum(current: Option<Value>, arg: &Value, wanted: std::cmp::Ordering) -> Value {
    match current {
        Some(existing) if compare_things(Some(arg), Some(&existing), None) != wanted => existing,
        _ => arg.clone(),
    }
}
