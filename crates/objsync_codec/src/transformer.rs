//! Value transformers for list and mapping attributes.

use crate::error::{CodecError, CodecResult};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Registered name of the list transformer.
pub const LIST_TRANSFORMER: &str = "ArrayToDataTransformer";

/// Registered name of the mapping transformer.
pub const MAP_TRANSFORMER: &str = "DictionaryToDataTransformer";

/// Reversibly converts a structured value to an opaque byte form.
///
/// Transformers never poison a record: the infallible [`transform`] and
/// [`reverse_transform`] entry points log the failure and return `None`,
/// which callers treat as "attribute unset" / "attribute absent".
///
/// [`transform`]: ValueTransformer::transform
/// [`reverse_transform`]: ValueTransformer::reverse_transform
pub trait ValueTransformer: Send + Sync {
    /// Name the transformer is registered under.
    fn name(&self) -> &str;

    /// Encodes a value, reporting why it could not be encoded.
    fn try_transform(&self, value: &Value) -> CodecResult<Vec<u8>>;

    /// Decodes bytes, reporting why they could not be decoded.
    fn try_reverse_transform(&self, bytes: &[u8]) -> CodecResult<Value>;

    /// Encodes a value, returning `None` when it is not encodable.
    fn transform(&self, value: &Value) -> Option<Vec<u8>> {
        match self.try_transform(value) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(transformer = self.name(), error = %e, "could not transform value to bytes");
                None
            }
        }
    }

    /// Decodes bytes, returning `None` when they are malformed.
    fn reverse_transform(&self, bytes: &[u8]) -> Option<Value> {
        match self.try_reverse_transform(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(transformer = self.name(), error = %e, "could not reverse transform bytes");
                None
            }
        }
    }
}

/// Encodes any serializable value through a transformer.
///
/// The value is first converted to a JSON tree, which rejects anything JSON
/// cannot represent (non-string map keys, for example).
pub fn encode<T: Serialize + ?Sized>(
    transformer: &dyn ValueTransformer,
    value: &T,
) -> Option<Vec<u8>> {
    match serde_json::to_value(value) {
        Ok(json) => transformer.transform(&json),
        Err(e) => {
            warn!(transformer = transformer.name(), error = %e, "value is not serializable as JSON");
            None
        }
    }
}

/// Returns a short name for the JSON shape of a value.
#[must_use]
pub fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::not_serializable(e.to_string()))
}

fn from_bytes(bytes: &[u8]) -> CodecResult<Value> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::malformed(e.to_string()))
}

/// Stores ordered lists as JSON bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListTransformer;

impl ValueTransformer for ListTransformer {
    fn name(&self) -> &str {
        LIST_TRANSFORMER
    }

    fn try_transform(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::Array(_) => to_bytes(value),
            other => Err(CodecError::UnexpectedShape {
                expected: "array",
                found: shape_name(other),
            }),
        }
    }

    fn try_reverse_transform(&self, bytes: &[u8]) -> CodecResult<Value> {
        match from_bytes(bytes)? {
            value @ Value::Array(_) => Ok(value),
            other => Err(CodecError::UnexpectedShape {
                expected: "array",
                found: shape_name(&other),
            }),
        }
    }
}

/// Stores key/value mappings as JSON bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapTransformer;

impl ValueTransformer for MapTransformer {
    fn name(&self) -> &str {
        MAP_TRANSFORMER
    }

    fn try_transform(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::Object(_) => to_bytes(value),
            other => Err(CodecError::UnexpectedShape {
                expected: "object",
                found: shape_name(other),
            }),
        }
    }

    fn try_reverse_transform(&self, bytes: &[u8]) -> CodecResult<Value> {
        match from_bytes(bytes)? {
            value @ Value::Object(_) => Ok(value),
            other => Err(CodecError::UnexpectedShape {
                expected: "object",
                found: shape_name(&other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn list_roundtrip() {
        let value = json!([1, "two", {"three": 3}, null]);
        let bytes = ListTransformer.transform(&value).unwrap();
        assert_eq!(ListTransformer.reverse_transform(&bytes), Some(value));
    }

    #[test]
    fn map_roundtrip() {
        let value = json!({"street": "Main", "number": 7, "tags": ["a", "b"]});
        let bytes = MapTransformer.transform(&value).unwrap();
        assert_eq!(MapTransformer.reverse_transform(&bytes), Some(value));
    }

    #[test]
    fn wrong_shape_yields_no_bytes() {
        assert!(ListTransformer.transform(&json!({"a": 1})).is_none());
        assert!(MapTransformer.transform(&json!([1, 2])).is_none());
        assert!(MapTransformer.transform(&json!("text")).is_none());
    }

    #[test]
    fn malformed_bytes_yield_nothing() {
        assert!(MapTransformer.reverse_transform(b"{not json").is_none());
        assert!(ListTransformer.reverse_transform(&[0xff, 0x00]).is_none());
    }

    #[test]
    fn decoded_shape_is_checked() {
        let bytes = MapTransformer.transform(&json!({"a": 1})).unwrap();
        let err = ListTransformer.try_reverse_transform(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnexpectedShape {
                expected: "array",
                found: "object"
            }
        );
    }

    #[test]
    fn encode_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "x");
        assert!(encode(&MapTransformer, &map).is_none());
    }

    #[test]
    fn encode_serializable_struct() {
        #[derive(Serialize)]
        struct Address {
            city: &'static str,
            zip: u32,
        }

        let bytes = encode(&MapTransformer, &Address { city: "Oslo", zip: 150 }).unwrap();
        let decoded = MapTransformer.reverse_transform(&bytes).unwrap();
        assert_eq!(decoded, json!({"city": "Oslo", "zip": 150}));
    }
}
