//! Persistence error types
//!
//! Error codes:
//! - TIDE_PERSISTENCE_CORRUPTION (FATAL) - too much of the datafile is unreadable
//! - TIDE_PERSISTENCE_WRITE_FAILED (ERROR) - append or compaction failed
//! - TIDE_PERSISTENCE_READ_FAILED (FATAL) - datafile could not be read
//! - TIDE_INVALID_ARGUMENT (ERROR) - bad filename or serialization hooks

use std::fmt;
use std::io;
use std::path::Path;

/// Severity levels for persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, store continues
    Error,
    /// Store cannot load
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Persistence error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorCode {
    /// Corrupt lines above the alert threshold
    Corruption,
    /// Log append or rewrite failed
    WriteFailed,
    /// Log read failed
    ReadFailed,
    /// Invalid filename or hook pair
    InvalidArgument,
}

impl PersistenceErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceErrorCode::Corruption => "TIDE_PERSISTENCE_CORRUPTION",
            PersistenceErrorCode::WriteFailed => "TIDE_PERSISTENCE_WRITE_FAILED",
            PersistenceErrorCode::ReadFailed => "TIDE_PERSISTENCE_READ_FAILED",
            PersistenceErrorCode::InvalidArgument => "TIDE_INVALID_ARGUMENT",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            PersistenceErrorCode::Corruption => Severity::Fatal,
            PersistenceErrorCode::ReadFailed => Severity::Fatal,
            PersistenceErrorCode::WriteFailed => Severity::Error,
            PersistenceErrorCode::InvalidArgument => Severity::Error,
        }
    }
}

impl fmt::Display for PersistenceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Persistence error with context
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceError {
    code: PersistenceErrorCode,
    message: String,
}

impl PersistenceError {
    /// Too many corrupt lines in the datafile
    pub fn corruption(corrupt: usize, total: usize, threshold: f64) -> Self {
        Self {
            code: PersistenceErrorCode::Corruption,
            message: format!(
                "{} of {} lines of the datafile are corrupt, above the {}% alert threshold; \
                 refusing to load to prevent data loss",
                corrupt,
                total,
                threshold * 100.0
            ),
        }
    }

    /// Write failure with the underlying I/O error
    pub fn write_failed(path: &Path, err: io::Error) -> Self {
        Self {
            code: PersistenceErrorCode::WriteFailed,
            message: format!("Failed to write {}: {}", path.display(), err),
        }
    }

    /// Write failure without an I/O error
    pub fn write_failed_msg(msg: impl Into<String>) -> Self {
        Self {
            code: PersistenceErrorCode::WriteFailed,
            message: msg.into(),
        }
    }

    /// Read failure with the underlying I/O error
    pub fn read_failed(path: &Path, err: io::Error) -> Self {
        Self {
            code: PersistenceErrorCode::ReadFailed,
            message: format!("Failed to read {}: {}", path.display(), err),
        }
    }

    /// The datafile name collides with the temp-file convention
    pub fn invalid_filename(path: &Path) -> Self {
        Self {
            code: PersistenceErrorCode::InvalidArgument,
            message: format!(
                "The datafile name can't end with a ~, which is reserved for crash safe backup files: {}",
                path.display()
            ),
        }
    }

    /// The serialization hooks are not inverses of each other
    pub fn hook_mismatch() -> Self {
        Self {
            code: PersistenceErrorCode::InvalidArgument,
            message: "before_deserialization is not the reverse of after_serialization, \
                      cautiously refusing to start to prevent data loss"
                .to_string(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PersistenceErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.code.severity() == Severity::Fatal
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for PersistenceError {}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
