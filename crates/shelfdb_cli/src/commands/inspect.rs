//! Inspect command implementation.

use super::{OutputFormat, Session};
use serde_json::json;
use shelfdb_core::TxMode;
use shelfdb_storage::BackingEngine;

/// Per-collection summary.
#[derive(Debug)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Primary key field.
    pub primary_key: String,
    /// Whether keys are generated.
    pub auto_increment: bool,
    /// Indexed fields.
    pub indexes: Vec<String>,
    /// Number of records.
    pub records: usize,
}

/// Gathers collection summaries in one read-only transaction.
pub fn collections(session: &Session) -> Result<Vec<CollectionInfo>, Box<dyn std::error::Error>> {
    let schema = session.engine.schema();
    let names: Vec<&str> = schema.collection_names().collect();
    let counts = session
        .engine
        .transaction(&names, TxMode::ReadOnly, |ctx| {
            names.iter().map(|name| ctx.count(name)).collect::<Result<Vec<_>, _>>()
        })?;

    Ok(schema
        .collections()
        .zip(counts)
        .map(|(collection, records)| CollectionInfo {
            name: collection.name().to_string(),
            primary_key: collection.primary_key().to_string(),
            auto_increment: collection.auto_increment(),
            indexes: collection.indexed_fields().map(String::from).collect(),
            records,
        })
        .collect())
}

/// Runs the inspect command.
pub fn run(session: &Session, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let engine = &session.engine;
    let databases = session.backing.database_names();
    let collections = collections(session)?;
    let location = session
        .backing
        .path()
        .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string());

    match format {
        OutputFormat::Text => {
            println!("Location:   {location}");
            println!("Databases:  {}", databases.join(", "));
            println!("Database:   {} (version {}, {})", engine.name(), engine.version(), engine.state());
            println!();
            println!("{:<16} {:<12} {:>8}  indexes", "collection", "key", "records");
            for c in &collections {
                let key = if c.auto_increment {
                    format!("{}+", c.primary_key)
                } else {
                    c.primary_key.clone()
                };
                println!(
                    "{:<16} {:<12} {:>8}  {}",
                    c.name,
                    key,
                    c.records,
                    c.indexes.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            let collections: Vec<_> = collections
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "primary_key": c.primary_key,
                        "auto_increment": c.auto_increment,
                        "indexes": c.indexes,
                        "records": c.records,
                    })
                })
                .collect();
            let report = json!({
                "location": location,
                "databases": databases,
                "database": engine.name(),
                "version": engine.version(),
                "state": engine.state().to_string(),
                "collections": collections,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
