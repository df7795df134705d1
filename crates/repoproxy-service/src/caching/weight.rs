use std::sync::Arc;

use serde_json::Value;

use super::{Validator, Weigher};

/// Bytes accounted per UTF-16 code unit of a string.
const BYTES_PER_CODE_UNIT: u64 = 2;
/// Bytes accounted per number.
const NUMBER_SIZE: u64 = 8;
/// Bytes accounted per boolean.
const BOOL_SIZE: u64 = 4;

fn string_footprint(s: &str) -> u64 {
    s.encode_utf16().count() as u64 * BYTES_PER_CODE_UNIT
}

/// Estimates the in-memory footprint of a JSON value.
///
/// Strings count two bytes per UTF-16 code unit, numbers eight bytes and booleans four. Objects
/// count their keys and values, arrays only their items, `null` is free.
pub fn json_footprint(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => BOOL_SIZE,
        Value::Number(_) => NUMBER_SIZE,
        Value::String(s) => string_footprint(s),
        Value::Array(items) => items.iter().map(json_footprint).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| string_footprint(key) + json_footprint(value))
            .sum(),
    }
}

/// The footprint of the validator half of an entry.
///
/// An entry is accounted as a record `{ etag: <tag>, data: <payload> }`, this is everything but
/// the payload.
pub fn validator_footprint(validator: &Validator) -> u64 {
    string_footprint("etag") + string_footprint(validator.tag()) + string_footprint("data")
}

/// The default [`Weigher`] for JSON payloads.
pub fn entry_weigher() -> Weigher<Arc<Value>> {
    Arc::new(|validator: &Validator, payload: &Arc<Value>| {
        validator_footprint(validator) + json_footprint(payload)
    })
}
