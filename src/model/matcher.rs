//! Document matching
//!
//! An array-valued field matches a condition when any of its elements does,
//! except for conditions that look at the array as a whole (`$size`,
//! `$elemMatch`, equality with an array).

use std::cmp::Ordering;

use serde_json::Value;

use super::errors::ModelResult;
use super::query::{ElemMatch, FieldCondition, Operator, Query};
use super::value::{are_things_equal, compare_things, date_millis, get_dot_value, is_primitive};

/// Returns true if the document satisfies the query
pub fn matches(doc: &Value, query: &Query) -> bool {
    match query {
        Query::And(parts) => parts.iter().all(|q| matches(doc, q)),
        Query::Or(parts) => parts.iter().any(|q| matches(doc, q)),
        Query::Not(inner) => !matches(doc, inner),
        Query::Field { path, condition } => {
            let value = get_dot_value(doc, path);
            match_field(value.as_deref(), condition, false)
        }
    }
}

/// Matches an arbitrary value against a raw query value.
///
/// Atoms are compared as a field value against a field condition; objects
/// are matched as documents. Used by `$pull`.
pub fn matches_value(candidate: &Value, query: &Value) -> ModelResult<bool> {
    if is_primitive(candidate) || is_primitive(query) {
        let condition = FieldCondition::parse(query)?;
        Ok(match_field(Some(candidate), &condition, false))
    } else {
        Ok(matches(candidate, &Query::parse(query)?))
    }
}

pub(crate) fn match_field(
    value: Option<&Value>,
    condition: &FieldCondition,
    treat_as_value: bool,
) -> bool {
    if !treat_as_value {
        if let Some(Value::Array(items)) = value {
            if condition.targets_whole_array() {
                return match_field(value, condition, true);
            }
            return items.iter().any(|item| match_field(Some(item), condition, false));
        }
    }

    match condition {
        FieldCondition::Equals(expected) => are_things_equal(value, Some(expected)),
        FieldCondition::Operators(ops) => ops.iter().all(|op| op.test(value)),
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => true,
        _ => date_millis(a).is_some() && date_millis(b).is_some(),
    }
}

fn compare_with(value: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    match value {
        Some(v) if comparable(v, bound) => accept(compare_things(Some(v), Some(bound), None)),
        _ => false,
    }
}

impl Operator {
    fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Operator::Lt(b) => compare_with(value, b, Ordering::is_lt),
            Operator::Lte(b) => compare_with(value, b, Ordering::is_le),
            Operator::Gt(b) => compare_with(value, b, Ordering::is_gt),
            Operator::Gte(b) => compare_with(value, b, Ordering::is_ge),
            Operator::Ne(b) => value.is_none() || !are_things_equal(value, Some(b)),
            Operator::In(list) => list.iter().any(|b| are_things_equal(value, Some(b))),
            Operator::Nin(list) => !list.iter().any(|b| are_things_equal(value, Some(b))),
            Operator::Regex(re) => matches!(value, Some(Value::String(s)) if re.is_match(s)),
            Operator::Exists(expected) => value.is_some() == *expected,
            Operator::Size(n) => {
                matches!(value, Some(Value::Array(items)) if items.len() as f64 == *n)
            }
            Operator::ElemMatch(elem) => match value {
                Some(Value::Array(items)) => items.iter().any(|item| elem.matches(item)),
                _ => false,
            },
        }
    }
}

impl ElemMatch {
    fn matches(&self, item: &Value) -> bool {
        if is_primitive(item) || self.raw_is_primitive {
            self.condition
                .as_ref()
                .map_or(false, |c| match_field(Some(item), c, false))
        } else {
            self.document.as_ref().map_or(false, |q| matches(item, q))
        }
    }
}
