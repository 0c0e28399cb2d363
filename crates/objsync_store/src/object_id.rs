//! Durable object identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// URI scheme used by [`ObjectId::uri`].
pub const URI_SCHEME: &str = "objsync";

/// Identifies one persisted object.
///
/// An object id is assigned when the object is inserted and never changes.
/// Its URI form (`objsync://<Entity>/<uuid>`) can be stored elsewhere and
/// resolved back to the object later.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    entity: String,
    key: Uuid,
}

impl ObjectId {
    /// Creates a fresh id for a new object of `entity`.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: Uuid::new_v4(),
        }
    }

    /// Creates an id from its parts.
    #[must_use]
    pub fn from_parts(entity: impl Into<String>, key: Uuid) -> Self {
        Self {
            entity: entity.into(),
            key,
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the per-entity key.
    #[must_use]
    pub const fn key(&self) -> Uuid {
        self.key
    }

    /// Returns the durable URI form.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{URI_SCHEME}://{}/{}", self.entity, self.key)
    }

    /// Parses the URI form. Returns `None` if the URI is not an object URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(URI_SCHEME)?.strip_prefix("://")?;
        let (entity, key) = rest.split_once('/')?;
        if entity.is_empty() {
            return None;
        }
        let key = Uuid::parse_str(key).ok()?;
        Some(Self::from_parts(entity, key))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}/{})", self.entity, self.key)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ObjectId::new("User");
        let b = ObjectId::new("User");
        assert_ne!(a, b);
        assert_eq!(a.entity(), "User");
    }

    #[test]
    fn uri_roundtrip() {
        let id = ObjectId::new("UserLink");
        let uri = id.uri();
        assert!(uri.starts_with("objsync://UserLink/"));
        assert_eq!(ObjectId::from_uri(&uri), Some(id));
    }

    #[test]
    fn rejects_foreign_uris() {
        assert!(ObjectId::from_uri("https://example.com/x").is_none());
        assert!(ObjectId::from_uri("objsync:///not-a-uuid").is_none());
        assert!(ObjectId::from_uri("objsync://User/not-a-uuid").is_none());
        assert!(ObjectId::from_uri("objsync://User").is_none());
    }
}
