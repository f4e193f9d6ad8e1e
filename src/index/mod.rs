//! Index subsystem for tidedb
//!
//! Each indexed field owns an ordered binary search tree mapping field values
//! to the documents holding them. Indexes live in memory only and are
//! rebuilt from the log on load.
//!
//! # Design Principles
//!
//! - Arena tree: parent links are slot numbers, never owning pointers
//! - Reversible: every insert, remove and update can be undone exactly
//! - Injectable randomness: the deletion replacement policy is a parameter
//!
//! # Invariants
//!
//! - BST ordering and parent links hold after every operation
//! - A failed multi-document operation leaves the index as it found it

mod errors;
mod field_index;
mod tree;

pub use errors::{IndexError, IndexResult};
pub use field_index::{FieldIndex, IndexKey, IndexOptions};
pub use tree::{
    BinarySearchTree, CheckValueEquality, CompareKeys, KeyConflict, RangeQuery, ReplacementPolicy,
};
