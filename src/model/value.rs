//! Document value ordering, equality and dotted-path access
//!
//! Documents are plain `serde_json::Value` objects. JSON has no date type,
//! so a date is stored as `{"$$date": <unix millis>}` and ordered as a date
//! everywhere a comparison happens.
//!
//! # Ordering
//!
//! undefined < null < number < string < boolean < date < array < object
//!
//! Arrays compare element-wise, then by length. Objects compare by their
//! sorted keys, then by the values under those keys.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Number, Value};

/// Key holding the millis of an encoded date
pub const DATE_KEY: &str = "$$date";

/// Custom ordering for strings, used by cursor sorts
pub type StringComparator = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Encodes unix millis as a date value
pub fn date_value(millis: i64) -> Value {
    let mut map = Map::new();
    map.insert(DATE_KEY.to_string(), Value::from(millis));
    Value::Object(map)
}

/// Current time as a date value
pub fn now_date() -> Value {
    date_value(chrono::Utc::now().timestamp_millis())
}

/// Returns the millis of a date value, `None` for anything else
pub fn date_millis(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(DATE_KEY).and_then(Value::as_f64),
        _ => None,
    }
}

/// True for values the matcher treats as atoms (dates included)
pub fn is_primitive(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
        Value::Object(_) => date_millis(value).is_some(),
        Value::Array(_) => false,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(v @ Value::Object(_)) if date_millis(v).is_some() => 5,
        Some(Value::Array(_)) => 6,
        Some(Value::Object(_)) => 7,
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// Integers compare exactly; f64 loses precision above 2^53.
fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    // a negative i64 against a u64 beyond i64::MAX
    if x.is_i64() && y.is_u64() {
        return Ordering::Less;
    }
    if x.is_u64() && y.is_i64() {
        return Ordering::Greater;
    }
    compare_f64(x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0))
}

/// Total order over document values. `None` stands for an absent field.
pub fn compare_things(
    a: Option<&Value>,
    b: Option<&Value>,
    compare_strings: Option<&StringComparator>,
) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ordering::Equal,
    };

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => match compare_strings {
            Some(cmp) => cmp(x, y),
            None => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ea, eb) in x.iter().zip(y.iter()) {
                let ord = compare_things(Some(ea), Some(eb), compare_strings);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            if let (Some(ma), Some(mb)) = (date_millis(a), date_millis(b)) {
                return compare_f64(ma, mb);
            }
            compare_objects(x, y, compare_strings)
        }
        _ => Ordering::Equal,
    }
}

fn compare_objects(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    compare_strings: Option<&StringComparator>,
) -> Ordering {
    let mut keys_a: Vec<&String> = a.keys().collect();
    let mut keys_b: Vec<&String> = b.keys().collect();
    keys_a.sort();
    keys_b.sort();

    for (ka, kb) in keys_a.iter().zip(keys_b.iter()) {
        let ord = ka.cmp(kb);
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = compare_things(a.get(*ka), b.get(*kb), compare_strings);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    keys_a.len().cmp(&keys_b.len())
}

/// Matching equality. An absent field never equals anything, not even
/// another absent field.
pub fn are_things_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(ea, eb)| values_equal(ea, eb))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, va)| y.get(k).map_or(false, |vb| values_equal(va, vb)))
        }
        _ => a == b,
    }
}

/// Reads a dotted path out of a document.
///
/// When the path crosses an array, a numeric segment selects one element and
/// any other segment maps the rest of the path over every element (elements
/// where the rest is absent are skipped).
pub fn get_dot_value<'a>(doc: &'a Value, path: &str) -> Option<Cow<'a, Value>> {
    let parts: Vec<&str> = path.split('.').collect();
    dot_value(Some(doc), &parts)
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn dot_value<'a>(value: Option<&'a Value>, parts: &[&str]) -> Option<Cow<'a, Value>> {
    let value = value?;
    let Some((first, rest)) = parts.split_first() else {
        return Some(Cow::Borrowed(value));
    };

    let next = child(value, first)?;
    if rest.is_empty() {
        return Some(Cow::Borrowed(next));
    }

    match next {
        Value::Array(items) => match rest[0].parse::<usize>() {
            Ok(i) => dot_value(items.get(i), &rest[1..]),
            Err(_) => {
                let mapped = items
                    .iter()
                    .filter_map(|item| dot_value(Some(item), rest).map(Cow::into_owned))
                    .collect();
                Some(Cow::Owned(Value::Array(mapped)))
            }
        },
        other => dot_value(Some(other), rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cmp(a: &Value, b: &Value) -> Ordering {
        compare_things(Some(a), Some(b), None)
    }

    #[test]
    fn test_type_ordering() {
        let ladder = [
            json!(null),
            json!(-3),
            json!("abc"),
            json!(false),
            date_value(0),
            json!([1]),
            json!({"a": 1}),
        ];
        for pair in ladder.windows(2) {
            assert_eq!(cmp(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
        assert_eq!(compare_things(None, Some(&json!(null)), None), Ordering::Less);
    }

    #[test]
    fn test_same_type_ordering() {
        assert_eq!(cmp(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(cmp(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(cmp(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(cmp(&date_value(10), &date_value(5)), Ordering::Greater);
        assert_eq!(cmp(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
        assert_eq!(cmp(&json!([1, 3]), &json!([1, 2, 0])), Ordering::Greater);
        assert_eq!(cmp(&json!({"a": 1}), &json!({"a": 2})), Ordering::Less);
    }

    #[test]
    fn test_large_integers_stay_distinct() {
        let a = json!(9_007_199_254_740_993i64);
        let b = json!(9_007_199_254_740_992i64);
        assert_eq!(cmp(&a, &b), Ordering::Greater);
        assert!(!are_things_equal(Some(&a), Some(&b)));
        assert_eq!(cmp(&json!(-1), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(cmp(&json!(u64::MAX), &json!(i64::MAX)), Ordering::Greater);
        assert_eq!(cmp(&json!(3), &json!(2.5)), Ordering::Greater);
    }

    #[test]
    fn test_custom_string_comparator() {
        let reverse: StringComparator = Arc::new(|a, b| b.cmp(a));
        assert_eq!(
            compare_things(Some(&json!("a")), Some(&json!("b")), Some(&reverse)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_equality_rules() {
        assert!(are_things_equal(Some(&json!(3)), Some(&json!(3.0))));
        assert!(are_things_equal(Some(&json!({"a": [1, 2]})), Some(&json!({"a": [1, 2]}))));
        assert!(!are_things_equal(Some(&json!([1])), Some(&json!(1))));
        assert!(!are_things_equal(None, None));
        assert!(are_things_equal(Some(&date_value(4)), Some(&date_value(4))));
    }

    #[test]
    fn test_dot_value_paths() {
        let doc = json!({
            "a": {"b": {"c": 5}},
            "planets": [{"name": "earth", "moons": 1}, {"name": "mars"}, {"name": "venus", "moons": 0}],
            "nums": [10, 20, 30]
        });

        assert_eq!(get_dot_value(&doc, "a.b.c").as_deref(), Some(&json!(5)));
        assert_eq!(get_dot_value(&doc, "a.x.c"), None);
        assert_eq!(
            get_dot_value(&doc, "planets.name").as_deref(),
            Some(&json!(["earth", "mars", "venus"]))
        );
        assert_eq!(get_dot_value(&doc, "planets.moons").as_deref(), Some(&json!([1, 0])));
        assert_eq!(get_dot_value(&doc, "planets.1.name").as_deref(), Some(&json!("mars")));
        assert_eq!(get_dot_value(&doc, "nums.2").as_deref(), Some(&json!(30)));
    }
}
