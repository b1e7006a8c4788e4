//! Backing engine trait definitions.
//!
//! These traits are the whole contract between the ShelfDB core and the
//! storage underneath it: open a named database at a version (migrating it
//! through an upgrade hook when the stored version is older), then run
//! batches of operations over one or more object stores that commit or
//! roll back as a unit.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxMode {
    /// Reads only; runs against a snapshot and never blocks writers.
    ReadOnly,
    /// Reads and writes; at most one per database at a time.
    ReadWrite,
}

impl fmt::Display for TxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxMode::ReadOnly => write!(f, "readonly"),
            TxMode::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// How an object store locates and generates record keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Field of the record map that holds the key.
    pub key_path: String,
    /// Whether missing keys are generated from a per-store counter.
    pub auto_increment: bool,
}

impl StoreOptions {
    /// Keys are always supplied by the caller.
    pub fn key_path(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            auto_increment: false,
        }
    }

    /// Missing keys are generated.
    pub fn auto_increment(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            auto_increment: true,
        }
    }
}

/// A non-unique lookup index over one record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within its store.
    pub name: String,
    /// Field whose values are indexed.
    pub field: String,
}

impl IndexSpec {
    /// Creates an index spec named after the field it covers.
    pub fn on_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            field,
        }
    }
}

/// One cursor step: the record key and the decoded record.
pub type CursorEntry = (Value, Value);

/// A lazy, finite, non-restartable scan in ascending key order.
pub type Cursor = Box<dyn Iterator<Item = StorageResult<CursorEntry>> + Send>;

/// The hook run when a database is opened at a newer version.
pub type UpgradeHook<'a> = dyn FnMut(&mut dyn VersionChange) -> StorageResult<()> + 'a;

/// Schema operations available while a database changes version.
///
/// Everything done through this handle is applied atomically together with
/// the version bump, or not at all if the hook fails.
pub trait VersionChange {
    /// Version stored before the change (0 for a new database).
    fn old_version(&self) -> u32;

    /// Version being opened.
    fn new_version(&self) -> u32;

    /// Names of the existing object stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Checks if an object store exists.
    fn contains_store(&self, name: &str) -> bool;

    /// Creates an empty object store.
    ///
    /// # Errors
    ///
    /// Fails with `StoreExists` if the name is taken.
    fn create_store(&mut self, name: &str, options: StoreOptions) -> StorageResult<()>;

    /// Checks if a store has an index with this name.
    fn contains_index(&self, store: &str, index: &str) -> bool;

    /// Creates an index and fills it from the store's current records.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownStore` or `IndexExists`.
    fn create_index(&mut self, store: &str, spec: IndexSpec) -> StorageResult<()>;
}

/// An engine hosting named, versioned databases.
pub trait BackingEngine: Send + Sync {
    /// Opens `name` at `version`.
    ///
    /// When the stored version is older, `upgrade` runs before this returns
    /// and nothing else can touch the database while it does.
    ///
    /// # Errors
    ///
    /// Fails for version 0, a version older than the stored one, storage
    /// errors, or whatever the hook returns.
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &mut UpgradeHook<'_>,
    ) -> StorageResult<Arc<dyn BackingDatabase>>;

    /// Removes a database and its contents. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Fails if persisted data cannot be removed.
    fn delete_database(&self, name: &str) -> StorageResult<bool>;

    /// Names of the databases this engine knows about.
    fn database_names(&self) -> Vec<String>;
}

/// An opened database.
pub trait BackingDatabase: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Committed schema version.
    fn version(&self) -> u32;

    /// Names of the object stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Starts a batch over `stores`.
    ///
    /// `ReadWrite` blocks until any other write batch on this database has
    /// finished.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownStore` if a store does not exist.
    fn transaction(&self, stores: &[&str], mode: TxMode)
        -> StorageResult<Box<dyn BackingTransaction>>;
}

/// A batch of operations over a fixed set of object stores.
///
/// Reads observe the batch's own writes. Nothing becomes visible to other
/// batches until [`BackingTransaction::commit`]; dropping the batch without
/// committing discards it.
pub trait BackingTransaction {
    /// Identifier for logging.
    fn id(&self) -> u64;

    /// Access mode.
    fn mode(&self) -> TxMode;

    /// Inserts a record, failing with `KeyExists` if the key is taken.
    /// Returns the record's key, generating one if needed.
    fn add(&mut self, store: &str, record: Value) -> StorageResult<Value>;

    /// Inserts or replaces a record. Returns the record's key.
    fn put(&mut self, store: &str, record: Value) -> StorageResult<Value>;

    /// Reads one record.
    fn get(&self, store: &str, key: &Value) -> StorageResult<Option<Value>>;

    /// Reads every record in key order.
    fn get_all(&self, store: &str) -> StorageResult<Vec<Value>>;

    /// Number of records in the store.
    fn count(&self, store: &str) -> StorageResult<usize>;

    /// Removes one record; missing keys are not an error.
    fn delete(&mut self, store: &str, key: &Value) -> StorageResult<()>;

    /// Removes every record. Key generators keep counting.
    fn clear(&mut self, store: &str) -> StorageResult<()>;

    /// Opens a cursor over the store as it is at this point of the batch.
    fn open_cursor(&self, store: &str) -> StorageResult<Cursor>;

    /// Keys of records whose indexed field equals `value`, in key order.
    /// Returns `None` if the store has no such index.
    fn index_keys(&self, store: &str, index: &str, value: &Value)
        -> StorageResult<Option<Vec<Value>>>;

    /// Applies every write of the batch atomically.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards every write of the batch.
    fn abort(self: Box<Self>);
}
