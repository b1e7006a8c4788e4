//! # ShelfDB Storage
//!
//! The backing engine underneath ShelfDB: named databases holding ordered
//! object stores, versioned schema migration and atomic batches.
//!
//! This crate is the adapter boundary. The core engine only talks to the
//! [`BackingEngine`], [`BackingDatabase`] and [`BackingTransaction`] traits,
//! so any ordered key-value engine with transactional batches can stand in.
//!
//! ## Design Principles
//!
//! - Records are maps with an in-line primary key at the store's key path
//! - Committed state is immutable and shared; writers build copy-on-write
//!   replacements that are swapped in on commit
//! - One writer per database at a time, readers never block
//! - The stored bytes are opaque CBOR produced by `shelfdb_codec`
//!
//! ## Available Engines
//!
//! - [`LocalEngine::in_memory`] - For tests and ephemeral databases
//! - [`LocalEngine::open`] - Same engine, imaged to a directory after each commit
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_codec::Value;
//! use shelfdb_storage::{BackingEngine, LocalEngine, StoreOptions, TxMode};
//! use std::collections::BTreeMap;
//!
//! let engine = LocalEngine::in_memory();
//! let db = engine
//!     .open("app", 1, &mut |change| {
//!         change.create_store("user", StoreOptions::auto_increment("id"))
//!     })
//!     .unwrap();
//!
//! let mut tx = db.transaction(&["user"], TxMode::ReadWrite).unwrap();
//! let mut record = BTreeMap::new();
//! record.insert("name".to_string(), Value::from("Marcus"));
//! let key = tx.add("user", Value::Map(record)).unwrap();
//! tx.commit().unwrap();
//! assert_eq!(key, Value::Integer(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod image;
mod local;
mod state;

pub use backend::{
    BackingDatabase, BackingEngine, BackingTransaction, Cursor, CursorEntry, IndexSpec,
    StoreOptions, TxMode, UpgradeHook, VersionChange,
};
pub use error::{StorageError, StorageResult};
pub use local::{LocalDatabase, LocalEngine};
