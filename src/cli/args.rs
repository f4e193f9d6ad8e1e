//! CLI argument definitions using clap
//!
//! Commands:
//! - tidedb find --config <path> [--limit <n>]
//! - tidedb count --config <path>
//! - tidedb insert --config <path>
//! - tidedb update --config <path>
//! - tidedb remove --config <path>
//! - tidedb ensure-index --config <path> --field <name> [--unique] [--sparse]
//! - tidedb compact --config <path>
//!
//! Query and document payloads are read as JSON from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tidedb - An embedded document store with an append-only datafile
#[derive(Parser, Debug)]
#[command(name = "tidedb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print documents matching the query read from stdin
    Find {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,

        /// Maximum number of documents to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Count documents matching the query read from stdin
    Count {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,
    },

    /// Insert the document (or array of documents) read from stdin
    Insert {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,
    },

    /// Apply {"query", "update", "multi", "upsert"} read from stdin
    Update {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,
    },

    /// Remove with {"query", "multi"} read from stdin
    Remove {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,
    },

    /// Create an index on a field
    EnsureIndex {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,

        /// Dotted field path to index
        #[arg(long)]
        field: String,

        /// Reject two documents with the same value
        #[arg(long)]
        unique: bool,

        /// Skip documents lacking the field
        #[arg(long)]
        sparse: bool,

        /// Expire documents whose date field is older than this
        #[arg(long)]
        expire_after_seconds: Option<f64>,
    },

    /// Rewrite the datafile without superseded lines
    Compact {
        /// Path to configuration file
        #[arg(long, default_value = "./tidedb.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
