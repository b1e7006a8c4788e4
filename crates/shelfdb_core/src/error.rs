//! Error types for ShelfDB core.

use shelfdb_codec::{CodecError, Value};
use shelfdb_storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShelfDB core operations.
///
/// Errors are `Clone` so a transaction context can keep the first failure
/// it saw and hand it back when the unit of work finishes.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Malformed schema definition.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// Opening or upgrading the database failed.
    #[error("connection to database '{name}' failed: {cause}")]
    Connection {
        /// Database name.
        name: String,
        /// Underlying failure.
        cause: Arc<CoreError>,
    },

    /// Operation attempted before the engine reached `Connected`.
    #[error("database '{name}' is not connected")]
    NotConnected {
        /// Database name.
        name: String,
    },

    /// A record with the same primary key already exists.
    #[error("conflict: key {key} already exists in collection '{collection}'")]
    Conflict {
        /// Collection name.
        collection: String,
        /// The duplicate key.
        key: Value,
    },

    /// No record with the given key.
    #[error("not found: no record with key {key} in collection '{collection}'")]
    NotFound {
        /// Collection name.
        collection: String,
        /// The missing key.
        key: Value,
    },

    /// Unknown collection or malformed query options.
    #[error("query error: {message}")]
    Query {
        /// Description of the problem.
        message: String,
    },

    /// Commit or abort failure, or misuse of a finished transaction.
    #[error("transaction error: {message}")]
    Transaction {
        /// Description of the problem.
        message: String,
    },

    /// A record does not match its collection schema.
    #[error("invalid record for collection '{collection}': {message}")]
    Validation {
        /// Collection name.
        collection: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A unit of work gave up on its own.
    #[error("aborted: {reason}")]
    Aborted {
        /// Reason given by the caller.
        reason: String,
    },

    /// Backing engine error with no closer category.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Wraps the cause of a failed open.
    pub fn connection(name: impl Into<String>, cause: CoreError) -> Self {
        Self::Connection {
            name: name.into(),
            cause: Arc::new(cause),
        }
    }

    /// Creates a not connected error.
    pub fn not_connected(name: impl Into<String>) -> Self {
        Self::NotConnected { name: name.into() }
    }

    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, key: Value) -> Self {
        Self::NotFound {
            collection: collection.into(),
            key,
        }
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates an aborted error, for units of work that bail out.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates an unknown collection error.
    pub fn unknown_collection(name: &str) -> Self {
        Self::query(format!("unknown collection '{name}'"))
    }

    /// Returns true for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for `Conflict`.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyExists { store, key } => Self::Conflict {
                collection: store,
                key,
            },
            StorageError::UnknownStore { name } => Self::unknown_collection(&name),
            StorageError::NotInScope { name } => {
                Self::query(format!("collection '{name}' is not part of this transaction"))
            }
            StorageError::ReadOnly { store } => Self::transaction(format!(
                "cannot write to '{store}' in a read-only transaction"
            )),
            StorageError::WriterActive { database } => Self::transaction(format!(
                "a read-write transaction on '{database}' is already open on this thread"
            )),
            StorageError::TransactionFinished => {
                Self::transaction("transaction already finished")
            }
            StorageError::MissingKey { store, key_path } => {
                Self::validation(store, format!("missing primary key '{key_path}'"))
            }
            StorageError::InvalidKey { store, type_name } => {
                Self::validation(store, format!("{type_name} cannot be a primary key"))
            }
            StorageError::InvalidRecord { store, message } => Self::validation(store, message),
            StorageError::Codec(e) => Self::Codec(e),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_into_taxonomy() {
        let err: CoreError = StorageError::KeyExists {
            store: "user".into(),
            key: Value::Integer(1),
        }
        .into();
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "conflict: key 1 already exists in collection 'user'"
        );

        let err: CoreError = StorageError::UnknownStore { name: "x".into() }.into();
        assert!(matches!(err, CoreError::Query { .. }));

        let err: CoreError = StorageError::ReadOnly {
            store: "user".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Transaction { .. }));

        let err: CoreError = StorageError::WriterActive {
            database: "app".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Transaction { .. }));

        let err: CoreError = StorageError::Corrupted("bad".into()).into();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[test]
    fn connection_error_carries_cause() {
        let cause = CoreError::from(StorageError::upgrade_failed("disk full"));
        let err = CoreError::connection("app", cause);
        assert!(err.to_string().starts_with("connection to database 'app' failed"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn errors_are_clone() {
        let err = CoreError::not_found("user", Value::Integer(99));
        let copy = err.clone();
        assert!(copy.is_not_found());
        assert_eq!(err.to_string(), copy.to_string());
    }
}
