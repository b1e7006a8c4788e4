//! CBOR encoding of values.
//!
//! The wire representation is plain CBOR produced by `ciborium`. Maps are
//! written in key order because [`Value::Map`] is a `BTreeMap`, so equal
//! values always encode to equal bytes.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};
use std::collections::BTreeMap;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if the writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(&to_cbor_value(value), &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error for malformed input, floats, tags, non-text map keys
/// and integers outside the i64 range.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let raw: Cbor =
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    from_cbor_value(raw)
}

fn to_cbor_value(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor_value).collect()),
        Value::Map(entries) => Cbor::Map(
            entries
                .iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor_value(v)))
                .collect(),
        ),
    }
}

fn from_cbor_value(raw: Cbor) -> CodecResult<Value> {
    match raw {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_cbor_value)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let Cbor::Text(key) = key else {
                    return Err(CodecError::NonTextMapKey);
                };
                map.insert(key, from_cbor_value(value)?);
            }
            Ok(Value::Map(map))
        }
        Cbor::Tag(tag, _) => Err(CodecError::unsupported_type(format!("tag({tag})"))),
        _ => Err(CodecError::unsupported_type("unknown")),
    }
}
