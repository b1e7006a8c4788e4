//! ShelfDB CLI
//!
//! Command-line tools for ShelfDB object stores.
//!
//! # Commands
//!
//! - `demo` - Run the user-service walkthrough
//! - `insert`, `get`, `update`, `delete` - Single record operations
//! - `select` - Query a collection
//! - `inspect` - Display databases, collections and record counts
//!
//! Without `--path` every command runs against a fresh in-memory engine.

mod commands;
mod convert;

use clap::{Parser, Subcommand};
use commands::{OutputFormat, Session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShelfDB command-line tools.
#[derive(Parser)]
#[command(name = "shelfdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory (in-memory if omitted)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Schema JSON file (defaults to the built-in user schema)
    #[arg(global = true, short, long)]
    schema: Option<PathBuf>,

    /// Database name
    #[arg(global = true, long, default_value = "app")]
    db: String,

    /// Schema version to open the database at
    #[arg(global = true, long, default_value_t = 1)]
    db_version: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create users, list them, age one atomically, find adults, delete one
    Demo,

    /// Insert a record given as a JSON object
    Insert {
        /// Collection name
        collection: String,
        /// Record JSON, e.g. '{"name": "Marcus", "age": 30}'
        record: String,
    },

    /// Fetch a record by primary key
    Get {
        /// Collection name
        collection: String,
        /// Primary key (integers are parsed as such)
        key: String,
    },

    /// Query a collection
    Select {
        /// Collection name
        collection: String,

        /// Equality filter as field=value (repeatable)
        #[arg(short, long = "equals", value_name = "FIELD=VALUE")]
        equals: Vec<String>,

        /// Order by this field
        #[arg(short, long)]
        order_by: Option<String>,

        /// Sort direction for --order-by (asc, desc)
        #[arg(short, long, default_value = "asc")]
        direction: String,

        /// Skip this many results
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Return at most this many results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replace a record given as a JSON object
    Update {
        /// Collection name
        collection: String,
        /// Record JSON including its primary key
        record: String,
    },

    /// Delete a record by primary key
    Delete {
        /// Collection name
        collection: String,
        /// Primary key
        key: String,
    },

    /// Display databases, collections and record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("ShelfDB CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let session = Session::open(
        cli.path.as_deref(),
        cli.schema.as_deref(),
        &cli.db,
        cli.db_version,
    )?;

    match cli.command {
        Commands::Demo => commands::demo::run(&session)?,
        Commands::Insert { collection, record } => {
            commands::records::insert(&session, &collection, &record)?;
        }
        Commands::Get { collection, key } => {
            commands::records::get(&session, &collection, &key)?;
        }
        Commands::Select {
            collection,
            equals,
            order_by,
            direction,
            offset,
            limit,
            format,
        } => {
            let options = commands::records::SelectOptions {
                equals,
                order_by,
                direction: direction.parse()?,
                offset,
                limit,
                format: format.parse::<OutputFormat>()?,
            };
            commands::records::select(&session, &collection, &options)?;
        }
        Commands::Update { collection, record } => {
            commands::records::update(&session, &collection, &record)?;
        }
        Commands::Delete { collection, key } => {
            commands::records::delete(&session, &collection, &key)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(&session, format.parse()?)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
