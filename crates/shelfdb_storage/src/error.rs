//! Error types for storage operations.

use shelfdb_codec::{CodecError, Value};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the backing engine.
///
/// The type is `Clone` so callers can retain an error while also
/// returning it; I/O errors are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The named object store does not exist.
    #[error("object store not found: {name}")]
    UnknownStore {
        /// Name of the store.
        name: String,
    },

    /// The store exists but was not part of the transaction's scope.
    #[error("object store {name} is not in the transaction scope")]
    NotInScope {
        /// Name of the store.
        name: String,
    },

    /// An object store with this name already exists.
    #[error("object store already exists: {name}")]
    StoreExists {
        /// Name of the store.
        name: String,
    },

    /// The index is already defined on the store.
    #[error("index {index} already exists on {store}")]
    IndexExists {
        /// Name of the store.
        store: String,
        /// Name of the index.
        index: String,
    },

    /// `add` found an existing record with the same key.
    #[error("key {key} already exists in {store}")]
    KeyExists {
        /// Name of the store.
        store: String,
        /// The conflicting key.
        key: Value,
    },

    /// The record has no key and the store does not generate keys.
    #[error("record for {store} has no value at key path {key_path}")]
    MissingKey {
        /// Name of the store.
        store: String,
        /// The key path that was empty.
        key_path: String,
    },

    /// The key has a type that cannot be used as a key.
    #[error("invalid key of type {type_name} for {store}")]
    InvalidKey {
        /// Name of the store.
        store: String,
        /// Type of the rejected key.
        type_name: &'static str,
    },

    /// The record is not a map.
    #[error("invalid record for {store}: {message}")]
    InvalidRecord {
        /// Name of the store.
        store: String,
        /// What was wrong.
        message: String,
    },

    /// A write was issued on a read-only transaction.
    #[error("transaction is read-only, cannot write to {store}")]
    ReadOnly {
        /// Name of the store.
        store: String,
    },

    /// The transaction has already committed or aborted.
    #[error("transaction already finished")]
    TransactionFinished,

    /// Database versions start at 1.
    #[error("invalid database version {version}")]
    InvalidVersion {
        /// The rejected version.
        version: u32,
    },

    /// The requested version is older than the stored one.
    #[error("requested version {requested} is older than stored version {stored}")]
    VersionDowngrade {
        /// Version that was requested.
        requested: u32,
        /// Version found in storage.
        stored: u32,
    },

    /// The calling thread already holds the database's write lock.
    #[error("a read-write transaction on {database} is already open on this thread")]
    WriterActive {
        /// Name of the database.
        database: String,
    },

    /// The database name cannot be used.
    #[error("invalid database name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: {path}")]
    Locked {
        /// Path of the directory.
        path: String,
    },

    /// A persisted image is unreadable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The upgrade hook rejected the version change.
    #[error("upgrade failed: {message}")]
    UpgradeFailed {
        /// Description of the failure.
        message: String,
    },
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl StorageError {
    /// Creates an upgrade failed error.
    pub fn upgrade_failed(message: impl Into<String>) -> Self {
        Self::UpgradeFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(store: &str, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            store: store.to_string(),
            message: message.into(),
        }
    }
}
