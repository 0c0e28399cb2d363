//! The storage capability consumed by contexts.

use crate::change::{ChangeSet, CommitReceipt, MergePolicy, StoredRow};
use crate::error::StoreResult;
use crate::model::Model;
use crate::object_id::ObjectId;
use crate::predicate::{FetchRequest, Predicate};
use crate::types::SequenceNumber;

/// A transactional object store.
///
/// Implementations serialize commits; every successful commit receives the
/// next [`SequenceNumber`], which also becomes the version of each row it
/// writes.
pub trait PersistentStore: Send + Sync {
    /// Returns the model the store was opened with.
    fn model(&self) -> &Model;

    /// Returns persisted rows matching the request, sorted and limited.
    fn fetch(&self, request: &FetchRequest) -> StoreResult<Vec<(ObjectId, StoredRow)>>;

    /// Returns one persisted row.
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredRow>>;

    /// Counts persisted rows of `entity` matching `predicate`.
    fn count(&self, entity: &str, predicate: Option<&Predicate>) -> StoreResult<usize>;

    /// Atomically applies a change set, resolving conflicts with `policy`.
    fn commit(&self, changes: ChangeSet, policy: MergePolicy) -> StoreResult<CommitReceipt>;

    /// Deletes every row of `entity` matching `predicate` without loading
    /// objects into a context.
    fn batch_delete(&self, entity: &str, predicate: Option<&Predicate>)
        -> StoreResult<CommitReceipt>;

    /// Sequence number of the latest commit.
    fn committed_seq(&self) -> SequenceNumber;

    /// Deletes all persisted data. The store is unusable afterwards.
    fn destroy(&self) -> StoreResult<()>;
}
