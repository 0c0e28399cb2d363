//! # objsync Core
//!
//! Synchronizes JSON payloads into a typed object store.
//!
//! This crate provides:
//! - [`DataStack`]: the store plus a view context and background contexts
//! - [`Context`]: an isolated object cache with its own serial queue
//! - [`EntityDescriptor`] and [`Registry`]: per-entity sync contracts,
//!   validated against the model
//! - [`SyncEngine`]: create-or-update reconciliation keyed by primary keys
//! - Attribute coercion from JSON to declared attribute types
//!
//! ## Usage
//!
//! ```
//! use objsync_core::{DataStackBuilder, EntityDescriptor, Registry, SyncEngine};
//! use objsync_store::{AttributeType, EntitySchema, Model};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Tag;
//!
//! impl EntityDescriptor for Tag {
//!     fn entity_name(&self) -> &str { "Tag" }
//!     fn default_sort_key(&self) -> &str { "label" }
//!     fn use_ascending_sort(&self) -> bool { true }
//!     fn element_to_property_mapping(&self) -> &[(&str, &str)] {
//!         &[("id", "tagId"), ("label", "label")]
//!     }
//!     fn primary_key_property(&self) -> &str { "tagId" }
//!     fn primary_key_element(&self) -> &str { "id" }
//! }
//!
//! let model = Model::builder()
//!     .entity(
//!         EntitySchema::new("Tag")
//!             .attribute("tagId", AttributeType::String)
//!             .attribute("label", AttributeType::String),
//!     )
//!     .build()
//!     .unwrap();
//! let registry = Registry::builder().register(Tag).build(&model).unwrap();
//! let stack = DataStackBuilder::new(model).open().unwrap();
//! let engine = SyncEngine::new(Arc::new(stack), Arc::new(registry));
//!
//! let payload = json!({"id": "t1", "label": "rust"});
//! engine.sync("Tag", Some(&payload)).unwrap();
//! engine.sync("Tag", Some(&payload)).unwrap();
//! assert_eq!(engine.stack().count("Tag", None, None).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coerce;
mod config;
mod context;
mod descriptor;
mod engine;
mod error;
mod key;
mod queue;
mod record;
mod registry;
mod stack;
mod typed;

pub use coerce::{coerce, parse_date, to_json};
pub use config::StackConfig;
pub use context::{Context, ContextKind, ContextPhase};
pub use descriptor::EntityDescriptor;
pub use engine::{SyncEngine, SyncScope, SyncStats};
pub use error::{CoreError, CoreResult};
pub use key::{match_predicate, KeyComponent, PrimaryKey, KEY_SEPARATOR};
pub use queue::SerialQueue;
pub use record::Record;
pub use registry::{Binding, Registry, RegistryBuilder};
pub use stack::{DataStack, DataStackBuilder};
pub use typed::{decode_model, decode_record};
