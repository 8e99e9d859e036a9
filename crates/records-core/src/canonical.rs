//! Canonical encoding for ledger writes.
//!
//! Every endorsing node runs the same handler and must arrive at the same
//! bytes for the same logical value. Objects are rebuilt with their keys in
//! ascending order at every depth, rendered as compact JSON and emitted as
//! UTF-8. Floating point numbers are refused outright.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::EncodeError;

/// Encodes `value` into its canonical byte form.
pub fn to_canonical_bytes<T>(value: &T) -> Result<Vec<u8>, EncodeError>
where
    T: Serialize + ?Sized,
{
    let value = canonicalize(serde_json::to_value(value)?)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Same as [`to_canonical_bytes`], returned as a string.
pub fn to_canonical_string<T>(value: &T) -> Result<String, EncodeError>
where
    T: Serialize + ?Sized,
{
    let value = canonicalize(serde_json::to_value(value)?)?;
    Ok(serde_json::to_string(&value)?)
}

/// Recursively sorts object keys and rejects non-integer numbers.
pub fn canonicalize(value: Value) -> Result<Value, EncodeError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, canonicalize(child)?);
            }
            Ok(Value::Object(sorted))
        }
        Value::Array(items) => items
            .into_iter()
            .map(canonicalize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Number(n) if n.is_f64() => Err(EncodeError::FloatingPoint(n.to_string())),
        other => Ok(other),
    }
}
