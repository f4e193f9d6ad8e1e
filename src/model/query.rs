//! Query AST
//!
//! A query object is parsed once into a tagged union; the matcher never
//! re-inspects the JSON shape per document.
//!
//! Top-level keys are either logical operators (`$or`, `$and`, `$not`) or
//! dotted field paths. A field's value is either a plain value (equality) or
//! an object made only of comparison operators. Mixing operators and plain
//! fields in one object is rejected.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::errors::{ModelError, ModelResult};
use super::value::{date_millis, is_primitive};

/// Parsed query
#[derive(Debug, Clone)]
pub enum Query {
    /// Every sub-query must match; also the shape of a top-level object
    And(Vec<Query>),
    /// At least one sub-query must match
    Or(Vec<Query>),
    /// Negation
    Not(Box<Query>),
    /// Condition on a dotted field path
    Field {
        path: String,
        condition: FieldCondition,
    },
}

/// Condition attached to one field
#[derive(Debug, Clone)]
pub enum FieldCondition {
    /// Implicit equality with a plain value
    Equals(Value),
    /// Operator object; every operator must hold
    Operators(Vec<Operator>),
}

/// Comparison operators
#[derive(Debug, Clone)]
pub enum Operator {
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex(Regex),
    Exists(bool),
    Size(f64),
    ElemMatch(Box<ElemMatch>),
}

/// `$elemMatch` argument.
///
/// Whether an element is matched as a document or as a value depends on the
/// element itself, so both readings are prepared up front.
#[derive(Debug, Clone)]
pub struct ElemMatch {
    pub(crate) raw_is_primitive: bool,
    pub(crate) document: Option<Query>,
    pub(crate) condition: Option<FieldCondition>,
}

impl Query {
    /// Parses a query object. `null` matches everything.
    pub fn parse(value: &Value) -> ModelResult<Query> {
        match value {
            Value::Null => Ok(Query::And(Vec::new())),
            Value::Object(map) => Self::parse_object(map),
            _ => Err(ModelError::query("a query must be an object")),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> ModelResult<Query> {
        let mut parts = Vec::with_capacity(map.len());

        for (key, value) in map {
            let part = match key.as_str() {
                "$or" | "$and" => {
                    let items = value.as_array().ok_or_else(|| {
                        ModelError::query(format!("{} operator used without an array", key))
                    })?;
                    let subs = items.iter().map(Query::parse).collect::<ModelResult<Vec<_>>>()?;
                    if key == "$or" {
                        Query::Or(subs)
                    } else {
                        Query::And(subs)
                    }
                }
                "$not" => Query::Not(Box::new(Query::parse(value)?)),
                "$where" => return Err(ModelError::query("$where is not supported")),
                op if op.starts_with('$') => {
                    return Err(ModelError::query(format!("Unknown logical operator {}", op)))
                }
                path => Query::Field {
                    path: path.to_string(),
                    condition: FieldCondition::parse(value)?,
                },
            };
            parts.push(part);
        }

        Ok(Query::And(parts))
    }

    /// Field conditions that sit directly at the top level of the query.
    /// Only these can drive index selection.
    pub fn top_level_fields(&self) -> Vec<(&str, &FieldCondition)> {
        match self {
            Query::And(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Query::Field { path, condition } => Some((path.as_str(), condition)),
                    _ => None,
                })
                .collect(),
            Query::Field { path, condition } => vec![(path.as_str(), condition)],
            _ => Vec::new(),
        }
    }
}

impl FieldCondition {
    /// Parses the value attached to a field path
    pub fn parse(value: &Value) -> ModelResult<FieldCondition> {
        let map = match value {
            Value::Object(map) if !map.is_empty() && date_millis(value).is_none() => map,
            other => return Ok(FieldCondition::Equals(other.clone())),
        };

        let dollar = map.keys().filter(|k| k.starts_with('$')).count();
        if dollar == 0 {
            return Ok(FieldCondition::Equals(value.clone()));
        }
        if dollar != map.len() {
            return Err(ModelError::query("You cannot mix operators and normal fields"));
        }

        let mut operators = Vec::with_capacity(map.len());
        for (name, arg) in map {
            let op = match name.as_str() {
                "$lt" => Operator::Lt(arg.clone()),
                "$lte" => Operator::Lte(arg.clone()),
                "$gt" => Operator::Gt(arg.clone()),
                "$gte" => Operator::Gte(arg.clone()),
                "$ne" => Operator::Ne(arg.clone()),
                "$in" => Operator::In(array_arg("$in", arg)?),
                "$nin" => Operator::Nin(array_arg("$nin", arg)?),
                "$regex" => Operator::Regex(build_regex(arg, map.get("$options"))?),
                "$options" => {
                    if !map.contains_key("$regex") {
                        return Err(ModelError::query("$options used without $regex"));
                    }
                    continue;
                }
                "$exists" => Operator::Exists(exists_flag(arg)),
                "$size" => {
                    let size = arg
                        .as_f64()
                        .filter(|n| n.fract() == 0.0)
                        .ok_or_else(|| ModelError::query("$size operator called without an integer"))?;
                    Operator::Size(size)
                }
                "$elemMatch" => Operator::ElemMatch(Box::new(ElemMatch::parse(arg)?)),
                other => {
                    return Err(ModelError::query(format!("Unknown comparison function {}", other)))
                }
            };
            operators.push(op);
        }

        Ok(FieldCondition::Operators(operators))
    }

    /// Plain scalar equality, the best index lookup
    pub fn equality_value(&self) -> Option<&Value> {
        match self {
            FieldCondition::Equals(v) if is_primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Values of a `$in` operator
    pub fn in_values(&self) -> Option<&[Value]> {
        match self {
            FieldCondition::Operators(ops) => ops.iter().find_map(|op| match op {
                Operator::In(values) => Some(values.as_slice()),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Range operators, if any are present
    pub fn range_bounds(&self) -> Option<RangeBounds<'_>> {
        let FieldCondition::Operators(ops) = self else {
            return None;
        };

        let mut bounds = RangeBounds::default();
        for op in ops {
            match op {
                Operator::Gt(v) => bounds.gt = Some(v),
                Operator::Gte(v) => bounds.gte = Some(v),
                Operator::Lt(v) => bounds.lt = Some(v),
                Operator::Lte(v) => bounds.lte = Some(v),
                _ => {}
            }
        }

        if bounds.is_empty() {
            None
        } else {
            Some(bounds)
        }
    }

    /// `$size`, `$elemMatch` and array equality look at the array as a whole
    /// instead of at each element.
    pub(crate) fn targets_whole_array(&self) -> bool {
        match self {
            FieldCondition::Equals(v) => v.is_array(),
            FieldCondition::Operators(ops) => ops
                .iter()
                .any(|op| matches!(op, Operator::Size(_) | Operator::ElemMatch(_))),
        }
    }
}

/// Borrowed range bounds of a field condition
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeBounds<'a> {
    pub gt: Option<&'a Value>,
    pub gte: Option<&'a Value>,
    pub lt: Option<&'a Value>,
    pub lte: Option<&'a Value>,
}

impl RangeBounds<'_> {
    fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }
}

impl ElemMatch {
    fn parse(arg: &Value) -> ModelResult<ElemMatch> {
        let document = Query::parse(arg);
        let condition = FieldCondition::parse(arg);

        if let (Err(e), Err(_)) = (&document, &condition) {
            return Err(e.clone());
        }

        Ok(ElemMatch {
            raw_is_primitive: is_primitive(arg),
            document: document.ok(),
            condition: condition.ok(),
        })
    }
}

fn array_arg(op: &str, arg: &Value) -> ModelResult<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| ModelError::query(format!("{} operator called with a non-array", op)))
}

fn build_regex(pattern: &Value, options: Option<&Value>) -> ModelResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| ModelError::query("$regex operator called with a non-string pattern"))?;
    let flags = options.and_then(Value::as_str).unwrap_or("");

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(ModelError::query(format!("Unsupported $options flag {}", other)))
            }
        };
    }

    builder
        .build()
        .map_err(|e| ModelError::query(format!("Invalid $regex: {}", e)))
}

/// `$exists` treats everything but `null`, `false` and `0` as true
fn exists_flag(arg: &Value) -> bool {
    match arg {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => true,
    }
}
