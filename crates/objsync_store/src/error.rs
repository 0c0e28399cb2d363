//! Error types for the store crate.

use crate::object_id::ObjectId;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal frame could not be encoded or decoded.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    /// A row changed in the store after the committing context read it.
    #[error("merge conflict on {id} for properties {properties:?}")]
    Conflict {
        /// The conflicting object.
        id: ObjectId,
        /// Properties whose persisted value moved.
        properties: Vec<String>,
    },

    /// The object does not exist in the store.
    #[error("object not found: {id}")]
    ObjectNotFound {
        /// The object that was looked up.
        id: ObjectId,
    },

    /// The entity is not part of the model.
    #[error("unknown entity: {name}")]
    UnknownEntity {
        /// Name that was looked up.
        name: String,
    },

    /// The property is neither an attribute nor a relationship of the entity.
    #[error("unknown property {property} on entity {entity}")]
    UnknownProperty {
        /// Entity name.
        entity: String,
        /// Property name.
        property: String,
    },

    /// The model failed validation.
    #[error("invalid model: {message}")]
    InvalidModel {
        /// Description of the problem.
        message: String,
    },

    /// An insert reused an existing object id.
    #[error("duplicate object: {id}")]
    DuplicateObject {
        /// The object id that already exists.
        id: ObjectId,
    },

    /// Another process holds the store directory lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The journal is unreadable beyond recovery.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The store was destroyed and can no longer be used.
    #[error("store has been removed")]
    Removed,
}

impl StoreError {
    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create an unknown entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Create an unknown property error.
    pub fn unknown_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Create an invalid model error.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidModel {
            message: message.into(),
        }
    }

    /// Create a corrupted journal error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::unknown_entity("Account");
        assert_eq!(err.to_string(), "unknown entity: Account");

        let err = StoreError::unknown_property("User", "nickname");
        assert!(err.to_string().contains("nickname"));
        assert!(err.to_string().contains("User"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
