//! Typed attribute values.

use crate::object_id::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Persisted values of one object, keyed by property name.
///
/// An absent key means the property is unset.
pub type Row = BTreeMap<String, AttributeValue>;

/// A value stored in an attribute or relationship.
///
/// The store does not force a value to match its declared attribute type:
/// coercion is best-effort, so a date attribute may hold the original string
/// when it could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 text.
    String(String),
    /// Signed integer. Booleans coerced from strings land here as 0/1.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// Absolute timestamp.
    Date(DateTime<Utc>),
    /// Opaque bytes, including transformed structured values.
    Binary(Vec<u8>),
    /// Structured value stored as-is when no transformer applies.
    Json(Value),
    /// To-one relationship target.
    Reference(ObjectId),
    /// To-many relationship targets.
    References(Vec<ObjectId>),
}

impl AttributeValue {
    /// Maps a JSON value to the nearest attribute value without coercion.
    ///
    /// Returns `None` for JSON `null`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(Self::Json(value.clone())),
        }
    }

    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Binary(_) => "binary",
            Self::Json(_) => "json",
            Self::Reference(_) => "reference",
            Self::References(_) => "references",
        }
    }

    /// Returns the text, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer. Booleans read as 0/1.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers widen.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value as a boolean. Integers read as non-zero.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a date.
    #[must_use]
    pub const fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the bytes, if this is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the structured value, if this is JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the target, if this is a to-one reference.
    #[must_use]
    pub const fn as_reference(&self) -> Option<&ObjectId> {
        match self {
            Self::Reference(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the targets, if this is a to-many reference.
    #[must_use]
    pub fn as_references(&self) -> Option<&[ObjectId]> {
        match self {
            Self::References(ids) => Some(ids),
            _ => None,
        }
    }

    /// Equality used by predicates.
    ///
    /// Numbers compare by value across integer and float, booleans equal
    /// their 0/1 integer form, and strings optionally ignore case.
    #[must_use]
    pub fn matches(&self, other: &Self, case_insensitive: bool) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) if case_insensitive => {
                a.to_lowercase() == b.to_lowercase()
            }
            (Self::Integer(_) | Self::Float(_) | Self::Boolean(_), _)
            | (_, Self::Integer(_) | Self::Float(_) | Self::Boolean(_)) => {
                match (self.numeric(), other.numeric()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }

    /// Total order used for sorting.
    ///
    /// Values of unrelated kinds order by kind so that sorting never fails.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Reference(a), Self::Reference(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Boolean(_) | Self::Integer(_) | Self::Float(_) => 0,
            Self::String(_) => 1,
            Self::Date(_) => 2,
            Self::Binary(_) => 3,
            Self::Json(_) => 4,
            Self::Reference(_) => 5,
            Self::References(_) => 6,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<ObjectId> for AttributeValue {
    fn from(value: ObjectId) -> Self {
        Self::Reference(value)
    }
}
