//! Entity schemas and the model that groups them.

use crate::error::{StoreError, StoreResult};
use std::collections::BTreeMap;

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// UTF-8 text.
    String,
    /// Signed integer.
    Integer,
    /// Double-precision float.
    Float,
    /// Boolean.
    Boolean,
    /// Absolute timestamp.
    Date,
    /// Opaque bytes.
    Binary,
    /// Structured value stored as bytes through a named transformer.
    Transformable {
        /// Name of the value transformer.
        transformer: String,
    },
}

impl AttributeType {
    /// Creates a transformable type using the named transformer.
    pub fn transformable(transformer: impl Into<String>) -> Self {
        Self::Transformable {
            transformer: transformer.into(),
        }
    }
}

/// A named reference from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Target entity name.
    pub target: String,
    /// Whether the relationship holds many targets.
    pub to_many: bool,
}

/// Attributes and relationships of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    name: String,
    attributes: BTreeMap<String, AttributeType>,
    relationships: BTreeMap<String, Relationship>,
    duplicates: Vec<String>,
}

impl EntitySchema {
    /// Starts a schema for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Declares an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        let name = name.into();
        if self.has_property(&name) {
            self.duplicates.push(name.clone());
        }
        self.attributes.insert(name, ty);
        self
    }

    /// Declares a to-one relationship.
    #[must_use]
    pub fn to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(name.into(), target.into(), false)
    }

    /// Declares a to-many relationship.
    #[must_use]
    pub fn to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(name.into(), target.into(), true)
    }

    fn relationship(mut self, name: String, target: String, to_many: bool) -> Self {
        if self.has_property(&name) {
            self.duplicates.push(name.clone());
        }
        self.relationships
            .insert(name, Relationship { target, to_many });
        self
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type of an attribute.
    #[must_use]
    pub fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        self.attributes.get(name)
    }

    /// Returns a relationship declaration.
    #[must_use]
    pub fn relationship_named(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Returns true if `name` is an attribute or relationship.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.relationships.contains_key(name)
    }

    /// Iterates over attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeType)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over relationships in name order.
    pub fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A validated set of entity schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Model {
    entities: BTreeMap<String, EntitySchema>,
}

impl Model {
    /// Starts building a model.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Looks up an entity schema.
    pub fn entity(&self, name: &str) -> StoreResult<&EntitySchema> {
        self.entities
            .get(name)
            .ok_or_else(|| StoreError::unknown_entity(name))
    }

    /// Returns true if the model declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Iterates over schemas in name order.
    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    /// Returns every transformer name referenced by an attribute.
    #[must_use]
    pub fn transformer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entities
            .values()
            .flat_map(|schema| schema.attributes.values())
            .filter_map(|ty| match ty {
                AttributeType::Transformable { transformer } => Some(transformer.as_str()),
                _ => None,
            })
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Collects entity schemas and validates them into a [`Model`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    schemas: Vec<EntitySchema>,
}

impl ModelBuilder {
    /// Adds an entity schema.
    #[must_use]
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validates the schemas and builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidModel`] for empty or duplicate entity
    /// names, duplicate property names, and relationships whose target is
    /// not declared.
    pub fn build(self) -> StoreResult<Model> {
        let mut entities = BTreeMap::new();
        for schema in self.schemas {
            if schema.name.is_empty() {
                return Err(StoreError::invalid_model("entity name is empty"));
            }
            if let Some(dup) = schema.duplicates.first() {
                return Err(StoreError::invalid_model(format!(
                    "property {dup} declared twice on {}",
                    schema.name
                )));
            }
            if entities.contains_key(&schema.name) {
                return Err(StoreError::invalid_model(format!(
                    "entity {} declared twice",
                    schema.name
                )));
            }
            entities.insert(schema.name.clone(), schema);
        }

        for schema in entities.values() {
            for (name, rel) in &schema.relationships {
                if !entities.contains_key(&rel.target) {
                    return Err(StoreError::invalid_model(format!(
                        "relationship {}.{name} targets unknown entity {}",
                        schema.name, rel.target
                    )));
                }
            }
        }

        Ok(Model { entities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> EntitySchema {
        EntitySchema::new("User")
            .attribute("userId", AttributeType::String)
            .attribute("firstName", AttributeType::String)
            .attribute("address", AttributeType::transformable("DictionaryToDataTransformer"))
            .to_one("link", "UserLink")
    }

    fn link() -> EntitySchema {
        EntitySchema::new("UserLink").attribute("selfLink", AttributeType::String)
    }

    #[test]
    fn builds_valid_model() {
        let model = Model::builder().entity(user()).entity(link()).build().unwrap();
        let schema = model.entity("User").unwrap();
        assert_eq!(schema.attribute_type("userId"), Some(&AttributeType::String));
        assert!(schema.has_property("link"));
        assert!(!schema.has_property("nickname"));
        assert_eq!(model.transformer_names(), vec!["DictionaryToDataTransformer"]);
    }

    #[test]
    fn unknown_entity_is_typed_miss() {
        let model = Model::builder().entity(link()).build().unwrap();
        assert!(matches!(
            model.entity("User"),
            Err(StoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn dangling_relationship_rejected() {
        let result = Model::builder().entity(user()).build();
        assert!(matches!(result, Err(StoreError::InvalidModel { .. })));
    }

    #[test]
    fn duplicate_names_rejected() {
        let schema = EntitySchema::new("A")
            .attribute("x", AttributeType::String)
            .attribute("x", AttributeType::Integer);
        assert!(Model::builder().entity(schema).build().is_err());

        let result = Model::builder().entity(link()).entity(link()).build();
        assert!(matches!(result, Err(StoreError::InvalidModel { .. })));
    }
}
