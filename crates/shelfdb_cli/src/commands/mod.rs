//! CLI command implementations.

pub mod demo;
pub mod inspect;
pub mod records;

use shelfdb_core::{CollectionDef, CoreResult, Engine, FieldDef, Repository, Schema};
use shelfdb_storage::LocalEngine;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Output format for commands that print data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per record.
    Text,
    /// Pretty JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{other}', expected text or json")),
        }
    }
}

/// The schema used when no `--schema` file is given.
pub fn default_schema() -> CoreResult<Schema> {
    Schema::define([(
        "user",
        CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("name", FieldDef::string().indexed())
            .field("age", FieldDef::integer()),
    )])
}

/// An open backing engine plus the connected database.
pub struct Session {
    /// The backing engine.
    pub backing: Arc<LocalEngine>,
    /// The connected engine.
    pub engine: Arc<Engine>,
}

impl Session {
    /// Opens the backing engine and connects to `db` at `version`.
    pub fn open(
        path: Option<&Path>,
        schema_file: Option<&Path>,
        db: &str,
        version: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let schema = match schema_file {
            Some(file) => Schema::from_json(&fs::read_to_string(file)?)?,
            None => default_schema()?,
        };
        let backing = Arc::new(match path {
            Some(path) => LocalEngine::open(path)?,
            None => LocalEngine::in_memory(),
        });
        let engine = Engine::connect(backing.clone(), db, version, schema)?;
        tracing::debug!(
            database = db,
            version,
            path = ?backing.path(),
            "session opened"
        );
        Ok(Self { backing, engine })
    }

    /// Repository for `collection`.
    pub fn repository(&self, collection: &str) -> CoreResult<Repository> {
        self.engine.repository(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn in_memory_session_uses_default_schema() {
        let session = Session::open(None, None, "app", 1).unwrap();
        assert!(session.engine.schema().collection("user").is_some());
        assert!(session.backing.path().is_none());
    }
}
