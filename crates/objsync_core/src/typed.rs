//! Typed views over JSON elements and records.

use crate::error::CoreResult;
use crate::record::Record;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::type_name;
use tracing::warn;

/// Decodes a JSON element into a model type.
///
/// Returns `None` and logs when the element does not fit `T`.
///
/// ```
/// use objsync_core::decode_model;
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Link {
///     avatar: String,
/// }
///
/// let link: Link = decode_model(&json!({"avatar": "a.png"})).unwrap();
/// assert_eq!(link.avatar, "a.png");
/// assert!(decode_model::<Link>(&json!({"avatar": 7})).is_none());
/// ```
#[must_use]
pub fn decode_model<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match T::deserialize(value) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!(model = type_name::<T>(), error = %e, "element does not decode");
            None
        }
    }
}

/// Renders `record` through (element, property) pairs and decodes the
/// result into a model type.
pub fn decode_record<T, E, P>(record: &Record, mapping: &[(E, P)]) -> CoreResult<Option<T>>
where
    T: DeserializeOwned,
    E: AsRef<str>,
    P: AsRef<str>,
{
    let element = record.to_response_element(mapping)?;
    Ok(decode_model(&Value::Object(element)))
}
