//! # objsync Store
//!
//! The storage collaborator used by `objsync_core`.
//!
//! This crate defines the data model (entity schemas with typed attributes
//! and relationships), typed attribute values, predicates and fetch requests,
//! and the [`PersistentStore`] capability that contexts commit through.
//!
//! [`LocalStore`] implements the capability. It keeps rows in memory and,
//! when configured with a directory, journals every commit to disk:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ journal.log       # Checksummed CBOR commit frames
//! ```
//!
//! ## Usage
//!
//! ```
//! use objsync_store::{
//!     AttributeType, ChangeSet, EntitySchema, FetchRequest, LocalStore, MergePolicy, Model,
//!     ObjectId, PersistentStore, Predicate, Row,
//! };
//!
//! let model = Model::builder()
//!     .entity(EntitySchema::new("User").attribute("userId", AttributeType::String))
//!     .build()
//!     .unwrap();
//! let store = LocalStore::in_memory(model).unwrap();
//!
//! let mut row = Row::new();
//! row.insert("userId".into(), "1".into());
//! let changes = ChangeSet {
//!     inserts: vec![(ObjectId::new("User"), row)],
//!     ..ChangeSet::default()
//! };
//! store.commit(changes, MergePolicy::Error).unwrap();
//!
//! let request = FetchRequest::new("User").predicate(Predicate::equals("userId", "1"));
//! assert_eq!(store.fetch(&request).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod config;
mod dir;
mod error;
mod journal;
mod local;
mod model;
mod object_id;
mod predicate;
mod store;
mod types;
mod value;

pub use change::{ChangeSet, CommitReceipt, MergePolicy, RowUpdate, StoredRow};
pub use config::{StoreConfig, StoreKind};
pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use model::{AttributeType, EntitySchema, Model, ModelBuilder, Relationship};
pub use object_id::{ObjectId, URI_SCHEME};
pub use predicate::{compare_rows, FetchRequest, Predicate, SortDescriptor};
pub use store::PersistentStore;
pub use types::SequenceNumber;
pub use value::{AttributeValue, Row};
