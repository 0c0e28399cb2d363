//! Primary key parsing and matching.

use crate::coerce::coerce;
use crate::registry::Binding;
use objsync_store::{AttributeType, Predicate};
use serde_json::{Map, Value};

/// Separator between components of a composite key.
pub const KEY_SEPARATOR: char = ',';

/// One property/element pair of a primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComponent {
    /// Property on the entity.
    pub property: String,
    /// Element in the JSON payload.
    pub element: String,
}

/// A parsed primary key declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    /// No key: every element is inserted as a new object.
    None,
    /// One property matched against one element.
    Simple(KeyComponent),
    /// Several properties matched position by position.
    Composite(Vec<KeyComponent>),
}

impl PrimaryKey {
    /// Parses the declared key names.
    ///
    /// An empty property or element name yields [`PrimaryKey::None`].
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when composite lists differ in
    /// length or contain empty names, or when a simple key contains the
    /// separator.
    pub fn parse(property: &str, element: &str, composite: bool) -> Result<Self, String> {
        let (property, element) = (property.trim(), element.trim());
        if property.is_empty() || element.is_empty() {
            return Ok(Self::None);
        }

        if !composite {
            if property.contains(KEY_SEPARATOR) || element.contains(KEY_SEPARATOR) {
                return Err(format!(
                    "key {property:?} contains '{KEY_SEPARATOR}' but is not declared composite"
                ));
            }
            return Ok(Self::Simple(KeyComponent {
                property: property.to_string(),
                element: element.to_string(),
            }));
        }

        let properties: Vec<&str> = property.split(KEY_SEPARATOR).map(str::trim).collect();
        let elements: Vec<&str> = element.split(KEY_SEPARATOR).map(str::trim).collect();
        if properties.len() != elements.len() {
            return Err(format!(
                "composite key has {} properties but {} elements",
                properties.len(),
                elements.len()
            ));
        }
        if properties.iter().chain(elements.iter()).any(|name| name.is_empty()) {
            return Err("composite key contains an empty name".to_string());
        }

        Ok(Self::Composite(
            properties
                .into_iter()
                .zip(elements)
                .map(|(p, e)| KeyComponent {
                    property: p.to_string(),
                    element: e.to_string(),
                })
                .collect(),
        ))
    }

    /// Returns the key components in declaration order.
    #[must_use]
    pub fn components(&self) -> &[KeyComponent] {
        match self {
            Self::None => &[],
            Self::Simple(component) => std::slice::from_ref(component),
            Self::Composite(components) => components,
        }
    }

    /// Returns true if `property` is part of the key.
    #[must_use]
    pub fn contains_property(&self, property: &str) -> bool {
        self.components().iter().any(|c| c.property == property)
    }
}

/// Builds the predicate locating the object `element` describes.
///
/// Every key component must be a non-empty JSON string; otherwise the
/// element is unmatchable and `None` is returned. Key values are coerced
/// with the key attribute's declared type before comparison.
#[must_use]
pub fn match_predicate(binding: &Binding, element: &Map<String, Value>) -> Option<Predicate> {
    let components = binding.primary_key().components();
    if components.is_empty() {
        return None;
    }

    let mut predicates = Vec::with_capacity(components.len());
    for component in components {
        let text = match element.get(&component.element) {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return None,
        };
        let ty = binding
            .schema()
            .attribute_type(&component.property)
            .unwrap_or(&AttributeType::String);
        let value = coerce(ty, &Value::String(text.clone()))?;
        predicates.push(if binding.is_case_insensitive_search() {
            Predicate::equals_ignore_case(component.property.as_str(), value)
        } else {
            Predicate::equals(component.property.as_str(), value)
        });
    }
    Some(Predicate::and(predicates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_mean_no_key() {
        assert_eq!(PrimaryKey::parse("primaryKey", "", false), Ok(PrimaryKey::None));
        assert_eq!(PrimaryKey::parse("", "id", false), Ok(PrimaryKey::None));
    }

    #[test]
    fn simple_key() {
        let key = PrimaryKey::parse("userId", "id", false).unwrap();
        assert_eq!(key.components().len(), 1);
        assert!(key.contains_property("userId"));
        assert!(PrimaryKey::parse("a,b", "x,y", false).is_err());
    }

    #[test]
    fn composite_key_is_position_aligned() {
        let key = PrimaryKey::parse("orgId, userId", "org,id", true).unwrap();
        let components = key.components();
        assert_eq!(components[0].property, "orgId");
        assert_eq!(components[0].element, "org");
        assert_eq!(components[1].property, "userId");
        assert_eq!(components[1].element, "id");
    }

    #[test]
    fn composite_arity_mismatch_rejected() {
        assert!(PrimaryKey::parse("a,b", "x", true).is_err());
        assert!(PrimaryKey::parse("a,", "x,y", true).is_err());
    }
}
