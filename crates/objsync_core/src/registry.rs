//! Descriptor registry validated against the model.

use crate::descriptor::EntityDescriptor;
use crate::error::{CoreError, CoreResult};
use crate::key::PrimaryKey;
use objsync_store::{EntitySchema, Model, SortDescriptor};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

fn is_attribute(schema: &EntitySchema, name: &str) -> bool {
    schema.attribute_type(name).is_some()
}

/// A descriptor checked against its entity schema.
pub struct Binding {
    descriptor: Arc<dyn EntityDescriptor>,
    schema: EntitySchema,
    mapping: Vec<(String, String)>,
    primary_key: PrimaryKey,
    sort: SortDescriptor,
    mapped_to_element: Option<String>,
    case_insensitive: bool,
}

impl Binding {
    fn new(descriptor: Arc<dyn EntityDescriptor>, model: &Model) -> CoreResult<Self> {
        let entity = descriptor.entity_name().to_string();
        let schema = model
            .entity(&entity)
            .map_err(|_| CoreError::invalid_descriptor(&entity, "entity is not in the model"))?
            .clone();

        let sort_key = descriptor.default_sort_key();
        if sort_key.is_empty() {
            return Err(CoreError::invalid_descriptor(&entity, "default sort key is empty"));
        }
        if !is_attribute(&schema, sort_key) {
            return Err(CoreError::unknown_property(&entity, sort_key));
        }

        let mut elements = HashSet::new();
        let mut mapping = Vec::new();
        for (element, property) in descriptor.element_to_property_mapping() {
            if element.is_empty() {
                return Err(CoreError::invalid_descriptor(&entity, "mapping has an empty element name"));
            }
            if !elements.insert(*element) {
                return Err(CoreError::invalid_descriptor(
                    &entity,
                    format!("element {element} is mapped twice"),
                ));
            }
            if !is_attribute(&schema, property) {
                return Err(CoreError::unknown_property(&entity, *property));
            }
            mapping.push(((*element).to_string(), (*property).to_string()));
        }

        let primary_key = PrimaryKey::parse(
            descriptor.primary_key_property(),
            descriptor.primary_key_element(),
            descriptor.has_composite_primary_key(),
        )
        .map_err(|message| CoreError::invalid_descriptor(&entity, message))?;
        if let Some(missing) = primary_key
            .components()
            .iter()
            .find(|c| !is_attribute(&schema, &c.property))
        {
            return Err(CoreError::unknown_property(&entity, missing.property.as_str()));
        }

        let mapped_to_element = match descriptor.mapped_to_element() {
            Some("") => {
                return Err(CoreError::invalid_descriptor(&entity, "mapped element name is empty"))
            }
            other => other.map(str::to_string),
        };

        Ok(Self {
            sort: SortDescriptor::new(sort_key, descriptor.use_ascending_sort()),
            case_insensitive: descriptor.is_case_insensitive_search(),
            descriptor,
            schema,
            mapping,
            primary_key,
            mapped_to_element,
        })
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.schema.name()
    }

    /// Returns the registered descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &dyn EntityDescriptor {
        self.descriptor.as_ref()
    }

    /// Returns the entity schema.
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Returns (element, property) pairs in declaration order.
    #[must_use]
    pub fn mapping(&self) -> &[(String, String)] {
        &self.mapping
    }

    /// Returns the parsed primary key.
    #[must_use]
    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    /// Returns the default sort.
    #[must_use]
    pub fn sort(&self) -> &SortDescriptor {
        &self.sort
    }

    /// Returns the wrapping JSON key, if any.
    #[must_use]
    pub fn mapped_to_element(&self) -> Option<&str> {
        self.mapped_to_element.as_deref()
    }

    /// Returns true if key matching ignores case.
    #[must_use]
    pub fn is_case_insensitive_search(&self) -> bool {
        self.case_insensitive
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("entity", &self.entity())
            .field("mapping", &self.mapping)
            .field("primary_key", &self.primary_key)
            .field("sort", &self.sort)
            .field("mapped_to_element", &self.mapped_to_element)
            .finish()
    }
}

/// Validated descriptors keyed by entity name.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: BTreeMap<String, Arc<Binding>>,
}

impl Registry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up the binding for `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntity`] if nothing is registered.
    pub fn binding(&self, entity: &str) -> CoreResult<Arc<Binding>> {
        self.bindings
            .get(entity)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity(entity))
    }

    /// Returns true if `entity` is registered.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.bindings.contains_key(entity)
    }

    /// Returns registered entity names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Collects descriptors for validation.
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<Arc<dyn EntityDescriptor>>,
}

impl RegistryBuilder {
    /// Adds a descriptor.
    #[must_use]
    pub fn register(mut self, descriptor: impl EntityDescriptor) -> Self {
        self.descriptors.push(Arc::new(descriptor));
        self
    }

    /// Adds a shared descriptor.
    #[must_use]
    pub fn register_shared(mut self, descriptor: Arc<dyn EntityDescriptor>) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validates every descriptor against `model`.
    ///
    /// # Errors
    ///
    /// Fails on the first descriptor whose entity, sort key, mapping or
    /// primary key does not fit the model, or on duplicate registrations.
    pub fn build(self, model: &Model) -> CoreResult<Registry> {
        let mut bindings = BTreeMap::new();
        for descriptor in self.descriptors {
            let binding = Binding::new(descriptor, model)?;
            let entity = binding.entity().to_string();
            if bindings.contains_key(&entity) {
                return Err(CoreError::invalid_descriptor(entity, "registered twice"));
            }
            debug!(entity = %entity, key = ?binding.primary_key, "descriptor registered");
            bindings.insert(entity, Arc::new(binding));
        }
        Ok(Registry { bindings })
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objsync_store::AttributeType;

    struct Fixed {
        name: &'static str,
        sort: &'static str,
        mapping: &'static [(&'static str, &'static str)],
        key: (&'static str, &'static str, bool),
    }

    impl EntityDescriptor for Fixed {
        fn entity_name(&self) -> &str {
            self.name
        }
        fn default_sort_key(&self) -> &str {
            self.sort
        }
        fn use_ascending_sort(&self) -> bool {
            true
        }
        fn element_to_property_mapping(&self) -> &[(&str, &str)] {
            self.mapping
        }
        fn primary_key_property(&self) -> &str {
            self.key.0
        }
        fn primary_key_element(&self) -> &str {
            self.key.1
        }
        fn has_composite_primary_key(&self) -> bool {
            self.key.2
        }
    }

    fn model() -> Model {
        Model::builder()
            .entity(
                EntitySchema::new("User")
                    .attribute("userId", AttributeType::String)
                    .attribute("firstName", AttributeType::String)
                    .to_one("link", "User"),
            )
            .build()
            .unwrap()
    }

    fn user() -> Fixed {
        Fixed {
            name: "User",
            sort: "firstName",
            mapping: &[("id", "userId"), ("first_name", "firstName")],
            key: ("userId", "id", false),
        }
    }

    #[test]
    fn valid_descriptor_binds() {
        let registry = Registry::builder().register(user()).build(&model()).unwrap();
        let binding = registry.binding("User").unwrap();
        assert_eq!(binding.sort().key, "firstName");
        assert_eq!(binding.mapping().len(), 2);
        assert!(matches!(
            registry.binding("Ghost"),
            Err(CoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn mapping_to_unknown_property_is_rejected() {
        let descriptor = Fixed {
            mapping: &[("nick", "nickname")],
            ..user()
        };
        let err = Registry::builder().register(descriptor).build(&model()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { ref property, .. } if property == "nickname"));
    }

    #[test]
    fn mapping_to_relationship_is_rejected() {
        let descriptor = Fixed {
            mapping: &[("link", "link")],
            ..user()
        };
        assert!(Registry::builder().register(descriptor).build(&model()).is_err());
    }

    #[test]
    fn empty_or_unknown_sort_key_is_rejected() {
        let empty = Fixed { sort: "", ..user() };
        assert!(matches!(
            Registry::builder().register(empty).build(&model()),
            Err(CoreError::InvalidDescriptor { .. })
        ));
        let unknown = Fixed { sort: "age", ..user() };
        assert!(Registry::builder().register(unknown).build(&model()).is_err());
    }

    #[test]
    fn duplicate_element_or_registration_is_rejected() {
        let dup = Fixed {
            mapping: &[("id", "userId"), ("id", "firstName")],
            ..user()
        };
        assert!(Registry::builder().register(dup).build(&model()).is_err());
        assert!(Registry::builder()
            .register(user())
            .register(user())
            .build(&model())
            .is_err());
    }

    #[test]
    fn bad_composite_key_is_rejected() {
        let descriptor = Fixed {
            key: ("userId,firstName", "id", true),
            ..user()
        };
        assert!(Registry::builder().register(descriptor).build(&model()).is_err());
    }

    #[test]
    fn entity_outside_model_is_rejected() {
        let descriptor = Fixed {
            name: "Ghost",
            ..user()
        };
        assert!(Registry::builder().register(descriptor).build(&model()).is_err());
    }
}
