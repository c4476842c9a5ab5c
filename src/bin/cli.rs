//! turbostore CLI
//!
//! Command-line interface for inspecting and editing a turbostore data
//! directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};
use turbostore::{CollectionName, Config, Store, StoreError};

/// turbostore CLI
#[derive(Parser, Debug)]
#[command(name = "turbostore-cli")]
#[command(about = "CLI for the turbostore embedded document store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./turbo_data")]
    data_dir: String,

    /// Database name
    #[arg(short = 'n', long, default_value = "Turbo.db")]
    db_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the data directory and declare all collections
    Init,

    /// List collections with their document counts
    Collections,

    /// Insert a JSON document
    Insert {
        /// Target collection
        collection: String,

        /// Document body, e.g. '{"studentId": 7}'
        document: String,
    },

    /// Find documents whose field equals a JSON value
    Find {
        /// Collection to search
        collection: String,

        /// Field name
        field: String,

        /// JSON value to match, e.g. 7 or '"abc"'
        value: String,
    },

    /// Count documents in a collection
    Count {
        /// Collection to count
        collection: String,
    },

    /// Remove a document by id
    Remove {
        /// Collection holding the document
        collection: String,

        /// Document id
        id: u64,
    },
}

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "info,turbostore=debug";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    exit_code(run(args).await)
}

/// Map the command outcome to an exit code, logging a failure once
fn exit_code(result: turbostore::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> turbostore::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .db_name(&args.db_name)
        .build();

    let store = Store::new(config)?;
    store.initialize().await?;

    let outcome = execute(&store, args.command).await;

    // Persist whatever the command changed, even if printing failed.
    let closed = store.close().await;
    outcome.and(closed)
}

async fn execute(store: &Store, command: Commands) -> turbostore::Result<()> {
    match command {
        Commands::Init => {
            println!("initialized {}", store.config().data_dir.display());
        }
        Commands::Collections => {
            let counts = store
                .run("list collections", |collections| {
                    let mut counts = Vec::with_capacity(CollectionName::ALL.len());
                    for name in CollectionName::ALL {
                        counts.push((name, collections.collection(name)?.count()));
                    }
                    Ok(counts)
                })
                .await?;
            for (name, count) in counts {
                println!("{:<20} {}", name, count);
            }
        }
        Commands::Insert {
            collection,
            document,
        } => {
            let name: CollectionName = collection.parse()?;
            let body = parse_json(&document)?;
            let id = store
                .run("insert", move |collections| {
                    collections.collection(name)?.insert(body)
                })
                .await?;
            println!("{}", id);
        }
        Commands::Find {
            collection,
            field,
            value,
        } => {
            let name: CollectionName = collection.parse()?;
            let value = parse_json(&value)?;
            let documents = store
                .run("find", move |collections| {
                    Ok(collections.collection(name)?.find_by(&field, &value))
                })
                .await?;
            for document in documents {
                println!("{}\t{}", document.id, document.data);
            }
        }
        Commands::Count { collection } => {
            let name: CollectionName = collection.parse()?;
            let count = store
                .run("count", move |collections| {
                    Ok(collections.collection(name)?.count())
                })
                .await?;
            println!("{}", count);
        }
        Commands::Remove { collection, id } => {
            let name: CollectionName = collection.parse()?;
            let removed = store
                .run("remove", move |collections| {
                    collections.collection(name)?.remove(id)
                })
                .await?;
            println!("removed {}\t{}", removed.id, removed.data);
        }
    }

    Ok(())
}

fn parse_json(text: &str) -> turbostore::Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| StoreError::InvalidDocument(format!("{}: {}", text, e)))
}
