//! # Model Errors
//!
//! Error types raised while validating documents, parsing queries and
//! applying update operators. None of them are fatal: they abort the
//! operation before any index or log mutation happens.

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Document, query and update errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Field name is reserved or the document shape is not storable
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Query object could not be understood
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Update object could not be applied
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl ModelError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::InvalidDocument(_) => "TIDE_INVALID_DOCUMENT",
            ModelError::InvalidQuery(_) => "TIDE_INVALID_QUERY",
            ModelError::InvalidUpdate(_) => "TIDE_INVALID_UPDATE",
        }
    }

    /// Model errors never poison the store
    pub fn is_fatal(&self) -> bool {
        false
    }

    pub(crate) fn document(msg: impl Into<String>) -> Self {
        ModelError::InvalidDocument(msg.into())
    }

    pub(crate) fn query(msg: impl Into<String>) -> Self {
        ModelError::InvalidQuery(msg.into())
    }

    pub(crate) fn update(msg: impl Into<String>) -> Self {
        ModelError::InvalidUpdate(msg.into())
    }
}
