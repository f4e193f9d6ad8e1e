//! Task executor for tidedb
//!
//! Every operation on a store runs as a task on a single worker, one at a
//! time, in submission order. This is the store's only concurrency control
//! over logical operations.
//!
//! # Execution Flow
//!
//! 1. `push` boxes the task and sends it over an unbounded channel
//! 2. The worker runs it at once if the executor is ready or the task is
//!    forced, otherwise buffers it
//! 3. `mark_ready` flushes the buffer in order
//! 4. The task's output comes back over a oneshot channel
//!
//! # Invariants
//!
//! - Tasks never interleave: a task's future completes before the next starts
//! - A task returning an error does not stop the queue
//! - No cancellation: a queued task always runs while the worker lives

mod errors;
mod executor;

pub use errors::{ExecutorError, ExecutorResult};
pub use executor::Executor;
