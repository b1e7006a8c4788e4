//! # ShelfDB Testkit
//!
//! Test utilities for ShelfDB.
//!
//! This crate provides:
//! - Test engines over in-memory or temporary directory storage
//! - A standard user schema and seed data
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::prelude::*;
//!
//! let db = TestEngine::memory();
//! let users = db.users();
//! seed_users(&users, &[("Marcus", 30), ("Lucius", 20)]);
//! assert_eq!(users.count().unwrap(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
