//! Cursor subsystem for tidedb
//!
//! A cursor wraps a query against a store and runs a fixed pipeline on
//! execution:
//!
//! 1. candidates from the best index (or a full scan)
//! 2. full match against the query
//! 3. stable multi-key sort
//! 4. skip and limit
//! 5. projection
//! 6. terminal (`Find`, `FindOne`, `Count`)

mod cursor;
mod projection;
mod sorter;

pub use cursor::{Count, Cursor, Find, FindOne, Terminal};
pub use projection::Projection;
pub use sorter::{ResultSorter, SortDirection, SortSpec};
