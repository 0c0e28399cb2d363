//! Attribute coercion between JSON and stored values.
//!
//! | Declared type | Raw shape | Result |
//! |---|---|---|
//! | string | number | stringified |
//! | integer, boolean | numeric string | parsed integer (0/1 for booleans) |
//! | float | numeric string | parsed float |
//! | date | RFC 3339 string | timestamp, or the original string if unparsable |
//! | transformable | JSON text or native object/array | structured value |
//!
//! Every other combination passes the raw value through unchanged.
//! Coercion never fails; JSON `null` clears the attribute.

use chrono::{DateTime, SecondsFormat, Utc};
use objsync_codec::TransformerRegistry;
use objsync_store::{AttributeType, AttributeValue};
use serde_json::{Number, Value};
use tracing::warn;

/// Converts a raw JSON value to the value an attribute of type `ty` stores.
///
/// Returns `None` for JSON `null`.
#[must_use]
pub fn coerce(ty: &AttributeType, raw: &Value) -> Option<AttributeValue> {
    let coerced = match (ty, raw) {
        (_, Value::Null) => return None,
        (AttributeType::String, Value::Number(n)) => Some(AttributeValue::String(n.to_string())),
        (AttributeType::Integer | AttributeType::Boolean, Value::String(s)) => {
            s.parse::<i64>().ok().map(AttributeValue::Integer)
        }
        (AttributeType::Float, Value::String(s)) => s.parse::<f64>().ok().map(AttributeValue::Float),
        (AttributeType::Date, Value::String(s)) => parse_date(s).map(AttributeValue::Date),
        (AttributeType::Transformable { .. }, Value::String(s)) => {
            match serde_json::from_str::<Value>(s) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => {
                    Some(AttributeValue::Json(parsed))
                }
                _ => None,
            }
        }
        _ => None,
    };
    coerced.or_else(|| AttributeValue::from_json(raw))
}

/// Parses an RFC 3339 timestamp, with or without fractional seconds.
#[must_use]
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Renders a stored value as JSON, the inverse of [`coerce`].
///
/// Dates render as RFC 3339 text and references as object URIs.
/// Transformable attributes are decoded through their transformer; bytes
/// that fail to decode render as absent.
#[must_use]
pub fn to_json(
    ty: Option<&AttributeType>,
    value: &AttributeValue,
    transformers: &TransformerRegistry,
) -> Option<Value> {
    match value {
        AttributeValue::String(s) => Some(Value::String(s.clone())),
        AttributeValue::Integer(i) => Some(Value::from(*i)),
        AttributeValue::Float(f) => Number::from_f64(*f).map(Value::Number),
        AttributeValue::Boolean(b) => Some(Value::Bool(*b)),
        AttributeValue::Date(d) => Some(Value::String(
            d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )),
        AttributeValue::Binary(bytes) => match ty {
            Some(AttributeType::Transformable { transformer }) => {
                decode_blob(transformer, bytes, transformers)
            }
            _ => Some(Value::from(bytes.clone())),
        },
        AttributeValue::Json(v) => Some(v.clone()),
        AttributeValue::Reference(id) => Some(Value::String(id.uri())),
        AttributeValue::References(ids) => Some(Value::Array(
            ids.iter().map(|id| Value::String(id.uri())).collect(),
        )),
    }
}

/// Encodes a structured value through the named transformer.
pub(crate) fn encode_blob(
    transformer: &str,
    value: &Value,
    transformers: &TransformerRegistry,
) -> Option<Vec<u8>> {
    match transformers.get(transformer) {
        Ok(t) => t.transform(value),
        Err(e) => {
            warn!(transformer, error = %e, "cannot encode attribute");
            None
        }
    }
}

/// Decodes bytes through the named transformer.
pub(crate) fn decode_blob(
    transformer: &str,
    bytes: &[u8],
    transformers: &TransformerRegistry,
) -> Option<Value> {
    match transformers.get(transformer) {
        Ok(t) => t.reverse_transform(bytes),
        Err(e) => {
            warn!(transformer, error = %e, "cannot decode attribute");
            None
        }
    }
}
