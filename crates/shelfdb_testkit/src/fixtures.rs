//! Test fixtures and engine helpers.

use shelfdb_core::{CollectionDef, Config, Engine, FieldDef, Record, Repository, Schema};
use shelfdb_storage::LocalEngine;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Name of the database every fixture opens.
pub const TEST_DB: &str = "test";

/// The `user` collection used throughout the tests:
/// `id` (integer primary key), `name` (indexed string), `age` (integer).
pub fn user_schema() -> Schema {
    Schema::define([(
        "user",
        CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("name", FieldDef::string().indexed())
            .field("age", FieldDef::integer()),
    )])
    .expect("user schema is valid")
}

/// A connected test engine with automatic cleanup.
pub struct TestEngine {
    /// The engine.
    pub engine: Arc<Engine>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Opens the user schema on an in-memory engine.
    pub fn memory() -> Self {
        Self::memory_with(user_schema(), Config::default())
    }

    /// Opens `schema` on an in-memory engine.
    pub fn memory_with(schema: Schema, config: Config) -> Self {
        let engine = Engine::with_config(
            Arc::new(LocalEngine::in_memory()),
            TEST_DB,
            1,
            schema,
            config,
        );
        engine.open().expect("Failed to open in-memory engine");
        Self {
            engine: Arc::new(engine),
            _temp_dir: None,
        }
    }

    /// Opens the user schema on an engine imaged to a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backing = LocalEngine::open(temp_dir.path()).expect("Failed to open data directory");
        let engine = Engine::connect(Arc::new(backing), TEST_DB, 1, user_schema())
            .expect("Failed to open file engine");
        Self {
            engine,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Repository over `user`.
    pub fn users(&self) -> Repository {
        self.engine
            .repository("user")
            .expect("user collection exists")
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Builds a user record without a key.
pub fn user(name: &str, age: i64) -> Record {
    Record::new().with("name", name).with("age", age)
}

/// Inserts users in order and returns the stored records.
pub fn seed_users(users: &Repository, rows: &[(&str, i64)]) -> Vec<Record> {
    rows.iter()
        .map(|(name, age)| users.insert(user(name, *age)).expect("Failed to seed user"))
        .collect()
}

/// Runs a test against a fresh in-memory user database.
pub fn with_users<F, R>(f: F) -> R
where
    F: FnOnce(&Repository) -> R,
{
    let db = TestEngine::memory();
    f(&db.users())
}
