//! # ShelfDB Codec
//!
//! Dynamic values and CBOR encoding for ShelfDB records.
//!
//! Records flow through ShelfDB as [`Value`] trees. The backing engine keeps
//! them as opaque CBOR bytes, so this crate owns the one place where the
//! byte representation is produced and parsed.
//!
//! ## Value Ordering
//!
//! [`Value`] is totally ordered. Variants rank
//! `Null < Bool < Integer < Text < Bytes < Array < Map` and values of the
//! same variant compare naturally. Primary keys and `order_by` queries both
//! rely on this order.
//!
//! ## Usage
//!
//! ```
//! use shelfdb_codec::{from_cbor, to_cbor, Value};
//!
//! let value = Value::from("Marcus");
//! let bytes = to_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use value::Value;
