//! CLI module for tidedb
//!
//! Provides one-shot commands over a datafile:
//! - find / count: query documents
//! - insert / update / remove: mutate documents
//! - ensure-index: create an index
//! - compact: rewrite the datafile

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    compact, count, ensure_index, find, insert, remove, run, run_command, update, RemoveRequest,
    UpdateRequest,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_response};
