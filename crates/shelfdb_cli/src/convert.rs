//! JSON to record conversion.

use serde_json::{Map, Number, Value as Json};
use shelfdb_codec::Value;
use shelfdb_core::Record;
use thiserror::Error;

/// Errors converting between JSON and records.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Records must be JSON objects.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// What was found instead.
        found: &'static str,
    },

    /// Only integers fit in a record.
    #[error("unsupported number {0}: only 64-bit integers are stored")]
    Number(Number),

    /// A `field=value` argument without `=`.
    #[error("expected FIELD=VALUE, got '{0}'")]
    Assignment(String),
}

/// Converts a JSON value.
pub fn from_json(json: Json) -> Result<Value, ConvertError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Integer(n.as_i64().ok_or(ConvertError::Number(n))?),
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| Ok((k, from_json(v)?)))
                .collect::<Result<_, ConvertError>>()?,
        ),
    })
}

/// Converts a value to JSON. Bytes become arrays of numbers.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => Json::from(*n),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// Parses a record from JSON object text.
pub fn parse_record(text: &str) -> Result<Record, ConvertError> {
    match from_json(serde_json::from_str(text)?)? {
        Value::Map(fields) => Ok(Record::from(fields)),
        other => Err(ConvertError::NotAnObject {
            found: other.type_name(),
        }),
    }
}

/// Renders a record as JSON.
pub fn record_json(record: &Record) -> Json {
    Json::Object(
        record
            .iter()
            .map(|(k, v)| (k.to_string(), to_json(v)))
            .collect(),
    )
}

/// Parses a command-line scalar: JSON if it parses, else plain text.
///
/// `1` is an integer, `"1"` and `Marcus` are text.
pub fn parse_scalar(text: &str) -> Result<Value, ConvertError> {
    match serde_json::from_str::<Json>(text) {
        Ok(json) => from_json(json),
        Err(_) => Ok(Value::Text(text.to_string())),
    }
}

/// Splits a `field=value` argument.
pub fn parse_assignment(text: &str) -> Result<(String, Value), ConvertError> {
    let (field, value) = text
        .split_once('=')
        .ok_or_else(|| ConvertError::Assignment(text.to_string()))?;
    Ok((field.trim().to_string(), parse_scalar(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_json() {
        let record = parse_record(r#"{"name": "Marcus", "age": 30, "tags": ["stoic"]}"#).unwrap();
        assert_eq!(record.get_str("name"), Some("Marcus"));
        assert_eq!(record.get_i64("age"), Some(30));
        assert_eq!(
            record.get("tags"),
            Some(&Value::Array(vec![Value::from("stoic")]))
        );
    }

    #[test]
    fn floats_and_non_objects_rejected() {
        assert!(matches!(
            parse_record(r#"{"height": 1.8}"#),
            Err(ConvertError::Number(_))
        ));
        assert!(matches!(
            parse_record("[1, 2]"),
            Err(ConvertError::NotAnObject { found: "array" })
        ));
    }

    #[test]
    fn scalars_and_assignments() {
        assert_eq!(parse_scalar("1").unwrap(), Value::Integer(1));
        assert_eq!(parse_scalar("Marcus").unwrap(), Value::from("Marcus"));
        assert_eq!(parse_scalar("\"1\"").unwrap(), Value::from("1"));

        let (field, value) = parse_assignment("age=30").unwrap();
        assert_eq!(field, "age");
        assert_eq!(value, Value::Integer(30));
        assert!(parse_assignment("age").is_err());
    }

    #[test]
    fn json_output() {
        let record = Record::new().with("id", 1).with("name", "Marcus");
        assert_eq!(
            record_json(&record).to_string(),
            r#"{"id":1,"name":"Marcus"}"#
        );
    }
}
