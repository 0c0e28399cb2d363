//! Named transformer registry.

use crate::error::{CodecError, CodecResult};
use crate::transformer::{ListTransformer, MapTransformer, ValueTransformer};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps transformer names to transformer instances.
///
/// Transformable attributes name their transformer in the model; the registry
/// resolves those names once, when the data stack is built.
pub struct TransformerRegistry {
    transformers: RwLock<HashMap<String, Arc<dyn ValueTransformer>>>,
}

impl TransformerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transformers: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the list and mapping transformers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ListTransformer));
        registry.register(Arc::new(MapTransformer));
        registry
    }

    /// Registers a transformer under its own name, replacing any previous one.
    pub fn register(&self, transformer: Arc<dyn ValueTransformer>) {
        let name = transformer.name().to_string();
        self.transformers.write().insert(name, transformer);
    }

    /// Looks up a transformer by name.
    pub fn get(&self, name: &str) -> CodecResult<Arc<dyn ValueTransformer>> {
        self.transformers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::unknown_transformer(name))
    }

    /// Returns true if a transformer is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transformers.read().contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transformers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{LIST_TRANSFORMER, MAP_TRANSFORMER};

    #[test]
    fn defaults_are_registered() {
        let registry = TransformerRegistry::with_defaults();
        assert!(registry.contains(LIST_TRANSFORMER));
        assert!(registry.contains(MAP_TRANSFORMER));
        assert_eq!(registry.names().len(), 2);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = TransformerRegistry::new();
        let err = registry.get(MAP_TRANSFORMER).err().unwrap();
        assert_eq!(err, CodecError::unknown_transformer(MAP_TRANSFORMER));
    }

    #[test]
    fn register_replaces_by_name() {
        let registry = TransformerRegistry::with_defaults();
        registry.register(Arc::new(ListTransformer));
        assert_eq!(registry.names().len(), 2);
    }
}
