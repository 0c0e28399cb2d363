//! Error types for the synchronization core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// Data-shape problems in payloads are not errors: they are logged and
/// skipped. These variants cover store failures and contract violations a
/// caller can act on.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] objsync_store::StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] objsync_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No descriptor is registered under the name.
    #[error("unknown entity: {name}")]
    UnknownEntity {
        /// Name that was looked up.
        name: String,
    },

    /// A descriptor does not fit the model.
    #[error("invalid descriptor for {entity}: {message}")]
    InvalidDescriptor {
        /// Entity name.
        entity: String,
        /// Description of the problem.
        message: String,
    },

    /// The property is not declared on the entity.
    #[error("unknown property {property} on entity {entity}")]
    UnknownProperty {
        /// Entity name.
        entity: String,
        /// Property name.
        property: String,
    },

    /// The object does not exist, or was deleted.
    #[error("object not found: {uri}")]
    ObjectNotFound {
        /// Object URI.
        uri: String,
    },

    /// The URI is not an object URI.
    #[error("invalid object URI: {uri}")]
    InvalidObjectUri {
        /// The rejected URI.
        uri: String,
    },

    /// The operation does not apply to its arguments.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Create an unknown entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Create an invalid descriptor error.
    pub fn invalid_descriptor(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create an unknown property error.
    pub fn unknown_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Create an object not found error.
    pub fn object_not_found(uri: impl Into<String>) -> Self {
        Self::ObjectNotFound { uri: uri.into() }
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::unknown_entity("Account");
        assert_eq!(err.to_string(), "unknown entity: Account");

        let err = CoreError::invalid_descriptor("User", "sort key is empty");
        assert!(err.to_string().contains("sort key is empty"));
    }

    #[test]
    fn store_error_converts() {
        let err: CoreError = objsync_store::StoreError::Locked.into();
        assert!(matches!(err, CoreError::Store(_)));
    }
}
