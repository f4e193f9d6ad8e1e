//! Document model for tidedb
//!
//! Pure functions over `serde_json::Value` documents: ordering and equality,
//! dotted-path access, validation, the query AST and matcher, and the update
//! operators.
//!
//! # Design Principles
//!
//! - Pure: nothing here touches indexes, the executor or the log
//! - Parse once: queries become a `Query` before any document is matched
//! - Copy on modify: `modify` never mutates its input
//!
//! # Invariants
//!
//! - A stored document passes `check_object`
//! - `compare_things` is a total order over values

use std::sync::Arc;

use serde_json::Value;

mod errors;
mod matcher;
mod modifier;
mod query;
mod validate;
mod value;

pub use errors::{ModelError, ModelResult};
pub use matcher::{matches, matches_value};
pub use modifier::{modify, set_dot_value, unset_dot_value};
pub use query::{FieldCondition, Operator, Query, RangeBounds};
pub use validate::{check_object, deep_copy};
pub use value::{
    are_things_equal, compare_things, date_millis, date_value, get_dot_value, is_primitive,
    now_date, StringComparator, DATE_KEY,
};

/// A stored document, shared by every index of a store
pub type Document = Arc<Value>;
