//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while transforming values to or from bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value has a shape the transformer does not handle.
    #[error("unexpected shape: expected {expected}, found {found}")]
    UnexpectedShape {
        /// Shape the transformer accepts.
        expected: &'static str,
        /// Shape that was supplied.
        found: &'static str,
    },

    /// The value could not be serialized as JSON.
    #[error("value is not serializable: {message}")]
    NotSerializable {
        /// Description of the serialization error.
        message: String,
    },

    /// Stored bytes could not be decoded.
    #[error("malformed bytes: {message}")]
    Malformed {
        /// Description of the decoding error.
        message: String,
    },

    /// No transformer is registered under the given name.
    #[error("unknown transformer: {name}")]
    UnknownTransformer {
        /// Name that was looked up.
        name: String,
    },
}

impl CodecError {
    /// Create a not-serializable error.
    pub fn not_serializable(message: impl Into<String>) -> Self {
        Self::NotSerializable {
            message: message.into(),
        }
    }

    /// Create a malformed-bytes error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an unknown-transformer error.
    pub fn unknown_transformer(name: impl Into<String>) -> Self {
        Self::UnknownTransformer { name: name.into() }
    }
}
