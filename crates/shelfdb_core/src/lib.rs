//! # ShelfDB Core
//!
//! Schema-driven object store engine for ShelfDB.
//!
//! This crate provides:
//! - A schema registry that creates and upgrades object stores
//! - The engine, which owns the connection to one backing database
//! - Transaction contexts spanning one or more collections
//! - A query engine with equality, filter, ordering and pagination
//! - Repositories: per-collection record operations
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_core::{CollectionDef, Direction, Engine, FieldDef, Query, Record, Schema};
//! use shelfdb_storage::LocalEngine;
//! use std::sync::Arc;
//!
//! let schema = Schema::define([(
//!     "user",
//!     CollectionDef::new()
//!         .field("id", FieldDef::integer().primary())
//!         .field("name", FieldDef::string().indexed())
//!         .field("age", FieldDef::integer()),
//! )])
//! .unwrap();
//!
//! let engine = Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema).unwrap();
//! let users = engine.repository("user").unwrap();
//!
//! users.insert(Record::new().with("name", "Marcus").with("age", 30)).unwrap();
//! users.insert(Record::new().with("name", "Lucius").with("age", 20)).unwrap();
//!
//! let older = users.update_by_key(1, |mut user| {
//!     let age = user.get_i64("age").unwrap_or(0);
//!     user.set("age", age + 1);
//!     Ok(user)
//! }).unwrap();
//! assert_eq!(older.get_i64("age"), Some(31));
//!
//! let by_age = users.select(&Query::new().order_by("age", Direction::Desc)).unwrap();
//! assert_eq!(by_age[0].get_str("name"), Some("Marcus"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod engine;
mod error;
mod query;
mod record;
mod repository;
mod schema;

pub use config::Config;
pub use context::{Context, Scan, TxState};
pub use engine::{ConnectionState, Engine};
pub use error::{CoreError, CoreResult};
pub use query::{scan, Comparator, Direction, Filter, OrderBy, Query};
pub use record::Record;
pub use repository::Repository;
pub use schema::{CollectionDef, CollectionSchema, FieldDef, FieldType, Schema};

pub use shelfdb_codec::Value;
pub use shelfdb_storage::TxMode;
