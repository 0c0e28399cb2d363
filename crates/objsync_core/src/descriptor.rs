//! Per-entity synchronization contract.

use crate::engine::SyncScope;
use crate::error::CoreResult;
use crate::record::Record;
use serde_json::{Map, Value};

/// Describes how JSON elements map onto one entity.
///
/// Implement this once per synchronized entity and register it with a
/// [`Registry`](crate::Registry), which validates it against the model.
///
/// ```
/// use objsync_core::EntityDescriptor;
///
/// struct Tag;
///
/// impl EntityDescriptor for Tag {
///     fn entity_name(&self) -> &str {
///         "Tag"
///     }
///     fn default_sort_key(&self) -> &str {
///         "label"
///     }
///     fn use_ascending_sort(&self) -> bool {
///         true
///     }
///     fn element_to_property_mapping(&self) -> &[(&str, &str)] {
///         &[("id", "tagId"), ("label", "label")]
///     }
///     fn primary_key_property(&self) -> &str {
///         "tagId"
///     }
///     fn primary_key_element(&self) -> &str {
///         "id"
///     }
/// }
/// ```
pub trait EntityDescriptor: Send + Sync + 'static {
    /// Name of the entity in the model.
    fn entity_name(&self) -> &str;

    /// Property used to order fetches. Must be a non-empty attribute name.
    fn default_sort_key(&self) -> &str;

    /// Sort direction for [`default_sort_key`](Self::default_sort_key).
    fn use_ascending_sort(&self) -> bool;

    /// Pairs of (JSON element name, property name). Element names are unique.
    fn element_to_property_mapping(&self) -> &[(&str, &str)];

    /// Primary key property, or comma-joined properties for a composite key.
    /// Empty when every element is inserted as a new object.
    fn primary_key_property(&self) -> &str;

    /// JSON element holding the primary key, position-aligned with
    /// [`primary_key_property`](Self::primary_key_property).
    fn primary_key_element(&self) -> &str;

    /// Whether the primary key names are comma-joined lists.
    fn has_composite_primary_key(&self) -> bool {
        false
    }

    /// JSON key wrapping this entity's element or elements. `None` means the
    /// whole payload is the element.
    fn mapped_to_element(&self) -> Option<&str> {
        None
    }

    /// Whether primary key matching ignores case.
    fn is_case_insensitive_search(&self) -> bool {
        false
    }

    /// Populates related entities after `record` was created or updated from
    /// `element`. Runs inside the same context as the record.
    ///
    /// Errors are logged and do not stop the sync.
    fn insert_related_entities(
        &self,
        record: &Record,
        element: &Map<String, Value>,
        scope: &SyncScope,
    ) -> CoreResult<()> {
        let _ = (record, element, scope);
        Ok(())
    }
}
