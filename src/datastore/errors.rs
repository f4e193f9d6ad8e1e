//! Datastore error types
//!
//! Wraps the subsystem errors so every public operation returns one type.
//!
//! Error codes:
//! - codes of the wrapped error, unchanged
//! - TIDE_INVALID_ARGUMENT (ERROR)
//! - TIDE_LOAD_FAILED (FATAL)

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::index::IndexError;
use crate::model::ModelError;
use crate::persistence::PersistenceError;

/// Result type for datastore operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Errors returned by `Datastore` and `Cursor`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatastoreError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Caller passed options or arguments that cannot be honored
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The datafile could not be loaded; the store rejects all work
    #[error("Datastore failed to load: {0}")]
    LoadFailed(String),
}

impl DatastoreError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        DatastoreError::InvalidArgument(msg.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            DatastoreError::Model(e) => e.code(),
            DatastoreError::Index(e) => e.code(),
            DatastoreError::Persistence(e) => e.code().code(),
            DatastoreError::Executor(e) => e.code(),
            DatastoreError::InvalidArgument(_) => "TIDE_INVALID_ARGUMENT",
            DatastoreError::LoadFailed(_) => "TIDE_LOAD_FAILED",
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            DatastoreError::Model(e) => e.is_fatal(),
            DatastoreError::Index(e) => e.is_fatal(),
            DatastoreError::Persistence(e) => e.is_fatal(),
            DatastoreError::Executor(e) => e.is_fatal(),
            DatastoreError::InvalidArgument(_) => false,
            DatastoreError::LoadFailed(_) => true,
        }
    }

    /// True for a unique constraint violation on any index
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatastoreError::Index(IndexError::UniqueViolated { .. }))
    }
}
