//! CLI command implementations
//!
//! Each invocation opens the store described by the config file, loads the
//! datafile, runs one operation and prints its result as JSON.

use std::future::Future;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::datastore::{Datastore, DatastoreOptions, RemoveOptions, UpdateOptions};
use crate::index::IndexOptions;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_response};

/// Payload of the `update` command
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub query: Value,
    pub update: Value,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub upsert: bool,
}

/// Payload of the `remove` command
#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    #[serde(default)]
    pub query: Value,
    #[serde(default)]
    pub multi: bool,
}

/// Parse arguments, install logging and run the command
pub fn run() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse_args();
    run_command(cli.command)
}

// Logs go to stderr so stdout stays one JSON response.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidedb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Find { config, limit } => {
            let query = read_request()?;
            with_store(&config, |store| async move { find(&store, query, limit).await })
        }
        Command::Count { config } => {
            let query = read_request()?;
            with_store(&config, |store| async move { count(&store, query).await })
        }
        Command::Insert { config } => {
            let docs = read_request()?;
            with_store(&config, |store| async move { insert(&store, docs).await })
        }
        Command::Update { config } => {
            let request: UpdateRequest = serde_json::from_value(read_request()?)?;
            with_store(&config, |store| async move { update(&store, request).await })
        }
        Command::Remove { config } => {
            let request: RemoveRequest = serde_json::from_value(read_request()?)?;
            with_store(&config, |store| async move { remove(&store, request).await })
        }
        Command::EnsureIndex {
            config,
            field,
            unique,
            sparse,
            expire_after_seconds,
        } => {
            let mut options = IndexOptions::new(field).unique(unique).sparse(sparse);
            options.expire_after_seconds = expire_after_seconds;
            with_store(&config, |store| async move { ensure_index(&store, options).await })
        }
        Command::Compact { config } => {
            with_store(&config, |store| async move { compact(&store).await })
        }
    }
}

/// Opens and loads the store, runs `op` on a fresh runtime and prints its
/// result
fn with_store<F, Fut>(config_path: &Path, op: F) -> CliResult<()>
where
    F: FnOnce(Datastore) -> Fut,
    Fut: Future<Output = CliResult<Value>>,
{
    let options = DatastoreOptions::load(config_path)
        .map_err(|e| CliError::config_error(e.to_string()))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    let data = rt.block_on(async move {
        let store = Datastore::new(options)?;
        store.load().await?;
        op(store).await
    })?;

    write_response(data)
}

/// Matching documents, at most `limit` of them
pub async fn find(store: &Datastore, query: Value, limit: Option<usize>) -> CliResult<Value> {
    let mut cursor = store.find(query);
    if let Some(limit) = limit {
        cursor = cursor.limit(limit);
    }
    Ok(Value::Array(cursor.exec().await?))
}

pub async fn count(store: &Datastore, query: Value) -> CliResult<Value> {
    let n = store.count(query).exec().await?;
    Ok(json!({ "count": n }))
}

/// Inserts one document, or every document of an array
pub async fn insert(store: &Datastore, docs: Value) -> CliResult<Value> {
    match docs {
        Value::Array(docs) => Ok(Value::Array(store.insert_many(docs).await?)),
        doc => Ok(store.insert(doc).await?),
    }
}

pub async fn update(store: &Datastore, request: UpdateRequest) -> CliResult<Value> {
    let options = UpdateOptions {
        multi: request.multi,
        upsert: request.upsert,
        return_updated_docs: true,
    };
    let outcome = store.update(request.query, request.update, options).await?;
    Ok(json!({
        "numAffected": outcome.num_affected,
        "upserted": outcome.upserted,
        "documents": outcome.updated_docs,
    }))
}

pub async fn remove(store: &Datastore, request: RemoveRequest) -> CliResult<Value> {
    let removed = store
        .remove(request.query, RemoveOptions { multi: request.multi })
        .await?;
    Ok(json!({ "numRemoved": removed }))
}

pub async fn ensure_index(store: &Datastore, options: IndexOptions) -> CliResult<Value> {
    store.ensure_index(options).await?;
    Ok(json!({ "indexes": store.index_names() }))
}

pub async fn compact(store: &Datastore) -> CliResult<Value> {
    store.compact_datafile().await?;
    Ok(json!({ "documents": store.get_all_data().len() }))
}
