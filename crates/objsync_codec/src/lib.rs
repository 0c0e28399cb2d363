//! # objsync Codec
//!
//! Reversible byte codecs for attributes that store structured data as blobs.
//!
//! Two transformers ship with the crate:
//! - [`ListTransformer`] for ordered lists
//! - [`MapTransformer`] for key/value mappings
//!
//! Both store the value as JSON bytes. Encoding checks the value's shape and
//! that it is representable as JSON; anything else yields no bytes rather than
//! an error, so one bad attribute never fails the record that carries it.
//!
//! ## Usage
//!
//! ```
//! use objsync_codec::{MapTransformer, ValueTransformer};
//! use serde_json::json;
//!
//! let value = json!({"city": "Oslo"});
//! let bytes = MapTransformer.transform(&value).unwrap();
//! assert_eq!(MapTransformer.reverse_transform(&bytes), Some(value));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod registry;
mod transformer;

pub use error::{CodecError, CodecResult};
pub use registry::TransformerRegistry;
pub use transformer::{
    encode, shape_name, ListTransformer, MapTransformer, ValueTransformer, LIST_TRANSFORMER,
    MAP_TRANSFORMER,
};
