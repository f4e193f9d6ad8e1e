//! Executor error types
//!
//! Error codes:
//! - TIDE_EXECUTOR_CLOSED (FATAL)
//! - TIDE_NO_RUNTIME (FATAL)

use thiserror::Error;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors raised while queueing a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The worker is gone; nothing queued will ever run
    #[error("Executor worker has stopped")]
    Closed,

    /// The executor was created outside a tokio runtime
    #[error("Executor requires a running tokio runtime")]
    NoRuntime,
}

impl ExecutorError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::Closed => "TIDE_EXECUTOR_CLOSED",
            ExecutorError::NoRuntime => "TIDE_NO_RUNTIME",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}
