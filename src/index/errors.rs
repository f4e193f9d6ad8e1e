//! Index error types
//!
//! Error codes:
//! - TIDE_UNIQUE_VIOLATED (ERROR)
//! - TIDE_INDEX_INVARIANT (FATAL)

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by an index or its tree
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// A unique index already holds the key
    #[error("Can't insert key {key}, it violates the unique constraint on field {field}")]
    UniqueViolated { field: String, key: String },

    /// A diagnostic check found a broken tree
    #[error("Index tree invariant violated: {0}")]
    InvariantViolated(String),
}

impl IndexError {
    pub(crate) fn unique_violated(field: impl Into<String>, key: impl Into<String>) -> Self {
        IndexError::UniqueViolated {
            field: field.into(),
            key: key.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        IndexError::InvariantViolated(reason.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::UniqueViolated { .. } => "TIDE_UNIQUE_VIOLATED",
            IndexError::InvariantViolated(_) => "TIDE_INDEX_INVARIANT",
        }
    }

    /// A broken tree cannot be trusted for anything else
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::InvariantViolated(_))
    }
}
