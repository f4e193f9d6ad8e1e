//! Result sorting for cursors
//!
//! Multi-key, stable sort over dotted field paths using the document value
//! ordering. String comparison can be overridden per store.

use std::cmp::Ordering;

use serde_json::Value;

use crate::datastore::{DatastoreError, DatastoreResult};
use crate::model::{compare_things, get_dot_value, Document, StringComparator};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::default().then_asc(field)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::default().then_desc(field)
    }

    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Asc));
        self
    }

    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Desc));
        self
    }

    /// Parses `{"field": 1, "other": -1}`, keeping key order
    pub fn from_value(value: &Value) -> DatastoreResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| DatastoreError::invalid_argument("sort must be an object"))?;

        let mut spec = Self::default();
        for (field, direction) in map {
            spec = match direction.as_f64() {
                Some(d) if d == 1.0 => spec.then_asc(field.as_str()),
                Some(d) if d == -1.0 => spec.then_desc(field.as_str()),
                _ => {
                    return Err(DatastoreError::invalid_argument(format!(
                        "sort direction for {} must be 1 or -1",
                        field
                    )))
                }
            };
        }
        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }
}

/// Sorts matched documents
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts documents according to the sort specification.
    ///
    /// Sort is stable: documents equal on every key keep their order.
    pub fn sort(documents: &mut Vec<Document>, spec: &SortSpec, compare_strings: Option<&StringComparator>) {
        if spec.is_empty() || documents.len() < 2 {
            return;
        }

        // each key is resolved once per document
        let mut decorated: Vec<(Vec<Option<Value>>, Document)> = documents
            .drain(..)
            .map(|doc| {
                let keys = spec
                    .keys
                    .iter()
                    .map(|(field, _)| get_dot_value(&doc, field).map(|v| v.into_owned()))
                    .collect();
                (keys, doc)
            })
            .collect();

        decorated.sort_by(|(a, _), (b, _)| {
            for (i, (_, direction)) in spec.keys.iter().enumerate() {
                let ordering = compare_things(a[i].as_ref(), b[i].as_ref(), compare_strings);
                let ordering = match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        documents.extend(decorated.into_iter().map(|(_, doc)| doc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values.into_iter().map(Arc::new).collect()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let mut d = docs(vec![
            json!({"_id": "c", "age": 30}),
            json!({"_id": "a", "age": 20}),
            json!({"_id": "b", "age": 25}),
        ]);

        ResultSorter::sort(&mut d, &SortSpec::asc("age"), None);
        assert_eq!(ids(&d), vec!["a", "b", "c"]);

        ResultSorter::sort(&mut d, &SortSpec::desc("age"), None);
        assert_eq!(ids(&d), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_stable_and_multi_key() {
        let mut d = docs(vec![
            json!({"_id": "1", "name": "bob", "age": 3}),
            json!({"_id": "2", "name": "al", "age": 3}),
            json!({"_id": "3", "name": "bob", "age": 1}),
            json!({"_id": "4", "name": "al", "age": 3}),
        ]);

        ResultSorter::sort(&mut d, &SortSpec::asc("name").then_desc("age"), None);
        assert_eq!(ids(&d), vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn test_missing_field_sorts_first() {
        let mut d = docs(vec![
            json!({"_id": "a", "x": 1}),
            json!({"_id": "b"}),
            json!({"_id": "c", "x": null}),
        ]);
        ResultSorter::sort(&mut d, &SortSpec::asc("x"), None);
        assert_eq!(ids(&d), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_custom_string_comparator() {
        let mut d = docs(vec![
            json!({"_id": "1", "name": "alpha"}),
            json!({"_id": "2", "name": "Zeta"}),
            json!({"_id": "3", "name": "beta"}),
        ]);

        ResultSorter::sort(&mut d, &SortSpec::asc("name"), None);
        assert_eq!(ids(&d), vec!["2", "1", "3"]);

        let case_insensitive: StringComparator =
            Arc::new(|a: &str, b: &str| a.to_lowercase().cmp(&b.to_lowercase()));
        ResultSorter::sort(&mut d, &SortSpec::asc("name"), Some(&case_insensitive));
        assert_eq!(ids(&d), vec!["1", "3", "2"]);
    }

    #[test]
    fn test_spec_from_value() {
        let spec = SortSpec::from_value(&json!({"b": -1, "a": 1})).unwrap();
        assert_eq!(
            spec.keys(),
            &[
                ("b".to_string(), SortDirection::Desc),
                ("a".to_string(), SortDirection::Asc)
            ]
        );
        assert!(SortSpec::from_value(&json!({"a": 2})).is_err());
        assert!(SortSpec::from_value(&json!([1])).is_err());
    }
}
