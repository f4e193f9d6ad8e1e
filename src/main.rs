//! tidedb command-line entry point
//!
//! Argument parsing, logging setup and the store itself all live in the
//! `cli` module. This binary only reports a failed command on stderr and
//! exits non-zero.

use tidedb::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
