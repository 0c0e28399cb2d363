//! Contexts: isolated object caches with their own serial queue.
//!
//! A context registers the objects it reads, tracks inserts, property
//! changes and deletes, and commits them to the store in one change set on
//! [`Context::save`]. Queries see the context's pending changes.
//!
//! A context is confined to the thread that created it and to its own
//! queue's worker thread. Touching it from any other thread panics. Every
//! read and write of its state runs as a job on its queue, so operations
//! take effect in the order they were submitted.

use crate::error::{CoreError, CoreResult};
use crate::queue::SerialQueue;
use crate::record::Record;
use objsync_codec::TransformerRegistry;
use objsync_store::{
    compare_rows, AttributeValue, ChangeSet, CommitReceipt, FetchRequest, MergePolicy, ObjectId,
    PersistentStore, Predicate, Row, RowUpdate, SequenceNumber, StoredRow,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, error, warn};

pub(crate) type CommitHook = Arc<dyn Fn(&CommitReceipt) + Send + Sync>;

/// Role of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// The long-lived foreground context.
    View,
    /// A short-lived writer.
    Background,
}

/// Lifecycle of a context's pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    /// No operation has run yet.
    Created,
    /// Operations ran since the last save or rollback.
    Active,
    /// The last pending changes were committed.
    Saved,
    /// The last pending changes were rolled back.
    Discarded,
}

#[derive(Debug, Clone)]
struct ManagedObject {
    /// `None` while the object is a fault.
    values: Option<Row>,
    version: SequenceNumber,
    /// Values of changed properties as read from the store.
    base: Row,
    changes: BTreeMap<String, Option<AttributeValue>>,
}

impl ManagedObject {
    fn fault(version: SequenceNumber) -> Self {
        Self {
            values: None,
            version,
            base: Row::new(),
            changes: BTreeMap::new(),
        }
    }

    fn loaded(values: Row, version: SequenceNumber) -> Self {
        Self {
            values: Some(values),
            ..Self::fault(version)
        }
    }

    fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Replaces the row with a persisted one, keeping local changes on top.
    fn rebase(&mut self, row: &StoredRow) {
        let mut values = row.values.clone();
        for (property, change) in &self.changes {
            match row.values.get(property) {
                Some(v) => self.base.insert(property.clone(), v.clone()),
                None => self.base.remove(property),
            };
            match change {
                Some(v) => values.insert(property.clone(), v.clone()),
                None => values.remove(property),
            };
        }
        self.values = Some(values);
        self.version = row.version;
    }
}

#[derive(Debug)]
struct ContextState {
    objects: HashMap<ObjectId, ManagedObject>,
    inserted: BTreeSet<ObjectId>,
    deleted: BTreeSet<ObjectId>,
    phase: ContextPhase,
}

impl ContextState {
    fn touch(&mut self) {
        self.phase = ContextPhase::Active;
    }

    fn has_changes(&self) -> bool {
        !self.inserted.is_empty()
            || !self.deleted.is_empty()
            || self.objects.values().any(ManagedObject::is_dirty)
    }
}

pub(crate) struct ContextInner {
    label: String,
    kind: ContextKind,
    merge_policy: MergePolicy,
    owner: ThreadId,
    queue: SerialQueue,
    state: Mutex<ContextState>,
    store: Arc<dyn PersistentStore>,
    transformers: Arc<TransformerRegistry>,
    on_commit: Option<CommitHook>,
}

/// A handle to a context. Clones share the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        kind: ContextKind,
        label: String,
        merge_policy: MergePolicy,
        store: Arc<dyn PersistentStore>,
        transformers: Arc<TransformerRegistry>,
        on_commit: Option<CommitHook>,
    ) -> CoreResult<Self> {
        let queue = SerialQueue::new(label.clone())?;
        debug!(context = %label, ?kind, ?merge_policy, "context created");
        Ok(Self {
            inner: Arc::new(ContextInner {
                label,
                kind,
                merge_policy,
                owner: thread::current().id(),
                queue,
                state: Mutex::new(ContextState {
                    objects: HashMap::new(),
                    inserted: BTreeSet::new(),
                    deleted: BTreeSet::new(),
                    phase: ContextPhase::Created,
                }),
                store,
                transformers,
                on_commit,
            }),
        })
    }

    /// Returns the context label, also used as its queue thread name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Returns the context's role.
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    /// Returns the merge policy used on save and on merges.
    #[must_use]
    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.merge_policy
    }

    /// Returns the lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ContextPhase {
        self.inner.state.lock().phase
    }

    /// Returns true if two handles refer to the same context.
    #[must_use]
    pub fn same_context(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if the current thread may use this context.
    #[must_use]
    pub fn is_accessible_from_current_thread(&self) -> bool {
        let current = thread::current().id();
        current == self.inner.owner || current == self.inner.queue.worker_id()
    }

    pub(crate) fn assert_confined(&self) {
        if !self.is_accessible_from_current_thread() {
            panic!(
                "context {} used from thread {:?}; it is confined to its creating thread and its queue",
                self.inner.label,
                thread::current().id()
            );
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.inner.store
    }

    pub(crate) fn transformers(&self) -> &TransformerRegistry {
        &self.inner.transformers
    }

    /// Runs `f` on the context's queue and waits for it.
    ///
    /// Calls from inside the queue run inline.
    pub fn perform_and_wait<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&Context) -> R + Send + 'static,
    {
        self.assert_confined();
        let context = self.clone();
        self.inner.queue.perform_and_wait(move || f(&context))
    }

    /// Schedules `f` on the context's queue without waiting.
    pub fn perform<F>(&self, f: F)
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        self.assert_confined();
        let context = self.clone();
        self.inner.queue.perform(move || f(&context));
    }

    /// Fetches records, including this context's pending changes.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the fetch.
    pub fn fetch(&self, request: FetchRequest) -> CoreResult<Vec<Record>> {
        self.perform_and_wait(move |ctx| ctx.fetch_now(&request))
    }

    /// Counts objects matching `predicate`, including pending changes.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the fetch.
    pub fn count(&self, entity: &str, predicate: Option<Predicate>) -> CoreResult<usize> {
        let request = FetchRequest::new(entity).maybe_predicate(predicate);
        self.perform_and_wait(move |ctx| ctx.matching_ids(&request).map(|ids| ids.len()))
    }

    /// Creates a new, unsaved object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the model has no such entity.
    pub fn insert(&self, entity: &str) -> CoreResult<Record> {
        let entity = entity.to_string();
        self.perform_and_wait(move |ctx| ctx.insert_now(&entity))
    }

    /// Returns the record for `id`, registering it as a fault if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotFound`] if the object does not exist
    /// or is deleted in this context.
    pub fn object(&self, id: &ObjectId) -> CoreResult<Record> {
        let id = id.clone();
        self.perform_and_wait(move |ctx| ctx.object_now(&id))
    }

    /// Marks a record for deletion on the next save.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the record belongs to
    /// another context.
    pub fn delete(&self, record: &Record) -> CoreResult<()> {
        self.assert_confined();
        if !self.same_context(record.context()) {
            return Err(CoreError::invalid_operation(
                "record belongs to a different context",
            ));
        }
        let id = record.id().clone();
        self.perform_and_wait(move |ctx| ctx.delete_now(&id));
        Ok(())
    }

    /// Returns true if the context has unsaved inserts, changes or deletes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.perform_and_wait(|ctx| ctx.inner.state.lock().has_changes())
    }

    /// Commits pending changes. Does nothing when there are none.
    ///
    /// On failure the error is logged and returned and the pending changes
    /// stay in the context.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when the store rejects the commit, for
    /// example a [`StoreError::Conflict`](objsync_store::StoreError::Conflict)
    /// under [`MergePolicy::Error`].
    pub fn save(&self) -> CoreResult<()> {
        self.perform_and_wait(|ctx| ctx.save_now())
    }

    /// Discards pending changes.
    pub fn rollback(&self) {
        self.perform_and_wait(|ctx| ctx.rollback_now());
    }

    fn insert_now(&self, entity: &str) -> CoreResult<Record> {
        self.inner.store.model().entity(entity)?;
        let id = ObjectId::new(entity);
        let mut state = self.inner.state.lock();
        state
            .objects
            .insert(id.clone(), ManagedObject::loaded(Row::new(), SequenceNumber::ZERO));
        state.inserted.insert(id.clone());
        state.touch();
        Ok(Record::new(id, self.clone()))
    }

    fn object_now(&self, id: &ObjectId) -> CoreResult<Record> {
        let mut state = self.inner.state.lock();
        if state.deleted.contains(id) {
            return Err(CoreError::object_not_found(id.uri()));
        }
        if !state.objects.contains_key(id) {
            let Some(row) = self.inner.store.get(id)? else {
                return Err(CoreError::object_not_found(id.uri()));
            };
            state.objects.insert(id.clone(), ManagedObject::fault(row.version));
        }
        Ok(Record::new(id.clone(), self.clone()))
    }

    fn delete_now(&self, id: &ObjectId) {
        let mut state = self.inner.state.lock();
        if state.inserted.remove(id) {
            state.objects.remove(id);
        } else {
            state.deleted.insert(id.clone());
        }
        state.touch();
    }

    fn rollback_now(&self) {
        let mut state = self.inner.state.lock();
        let inserted = std::mem::take(&mut state.inserted);
        for id in &inserted {
            state.objects.remove(id);
        }
        state.deleted.clear();
        for object in state.objects.values_mut() {
            if !object.is_dirty() {
                continue;
            }
            if let Some(values) = object.values.as_mut() {
                for property in object.changes.keys() {
                    match object.base.get(property) {
                        Some(v) => values.insert(property.clone(), v.clone()),
                        None => values.remove(property),
                    };
                }
            }
            object.changes.clear();
            object.base.clear();
        }
        state.phase = ContextPhase::Discarded;
        debug!(context = %self.inner.label, "pending changes discarded");
    }

    fn fetch_now(&self, request: &FetchRequest) -> CoreResult<Vec<Record>> {
        Ok(self
            .matching_ids(request)?
            .into_iter()
            .map(|id| Record::new(id, self.clone()))
            .collect())
    }

    fn matching_ids(&self, request: &FetchRequest) -> CoreResult<Vec<ObjectId>> {
        let store_request = FetchRequest {
            sort: Vec::new(),
            limit: 0,
            ..request.clone()
        };
        let rows = self.inner.store.fetch(&store_request)?;

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.touch();
        let mut hits: Vec<(ObjectId, Row)> = Vec::new();
        let mut local: HashSet<ObjectId> = state.inserted.iter().cloned().collect();

        for (id, row) in rows {
            if state.deleted.contains(&id) {
                continue;
            }
            match state.objects.get_mut(&id) {
                Some(object) if object.is_dirty() => {
                    local.insert(id);
                }
                Some(object) => {
                    if object.values.is_some() || !request.want_fault {
                        object.values = Some(row.values.clone());
                    }
                    object.version = row.version;
                    hits.push((id, row.values));
                }
                None => {
                    let object = if request.want_fault {
                        ManagedObject::fault(row.version)
                    } else {
                        ManagedObject::loaded(row.values.clone(), row.version)
                    };
                    state.objects.insert(id.clone(), object);
                    hits.push((id, row.values));
                }
            }
        }

        for (id, object) in &state.objects {
            if id.entity() != request.entity
                || state.deleted.contains(id)
                || !(object.is_dirty() || local.contains(id))
            {
                continue;
            }
            if let Some(values) = &object.values {
                if request.matches(values) {
                    hits.push((id.clone(), values.clone()));
                }
            }
        }

        hits.sort_by(|(a_id, a), (b_id, b)| {
            compare_rows(a, b, &request.sort).then_with(|| a_id.cmp(b_id))
        });
        hits.dedup_by(|a, b| a.0 == b.0);
        if request.limit > 0 {
            hits.truncate(request.limit);
        }
        Ok(hits.into_iter().map(|(id, _)| id).collect())
    }

    fn save_now(&self) -> CoreResult<()> {
        let changes = {
            let state = self.inner.state.lock();
            if !state.has_changes() {
                debug!(context = %self.inner.label, "save skipped: no changes");
                return Ok(());
            }
            build_change_set(&state)
        };

        let count = changes.len();
        let receipt = match self.inner.store.commit(changes, self.inner.merge_policy) {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(context = %self.inner.label, error = %e, "could not save context");
                return Err(e.into());
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.inserted.clear();
            state.deleted.clear();
            for (id, row) in receipt.written() {
                state
                    .objects
                    .insert(id.clone(), ManagedObject::loaded(row.values.clone(), row.version));
            }
            for id in &receipt.deleted {
                state.objects.remove(id);
            }
            state.phase = ContextPhase::Saved;
        }
        debug!(context = %self.inner.label, objects = count, seq = %receipt.sequence, "context saved");

        if let Some(hook) = &self.inner.on_commit {
            hook(&receipt);
        }
        Ok(())
    }

    /// Absorbs another context's commit.
    ///
    /// Clean objects take the persisted rows. Objects with local changes are
    /// resolved with this context's merge policy. Called from another
    /// context's queue, the merge is scheduled behind this context's pending
    /// work.
    pub(crate) fn merge_changes(&self, receipt: &CommitReceipt) {
        if self.inner.queue.is_current() {
            self.merge_now(receipt);
            return;
        }
        let context = self.clone();
        let receipt = receipt.clone();
        self.inner.queue.perform(move || context.merge_now(&receipt));
    }

    fn merge_now(&self, receipt: &CommitReceipt) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let policy = self.inner.merge_policy;
        let mut merged = 0usize;

        for (id, row) in receipt.written() {
            let Some(object) = state.objects.get_mut(id) else {
                continue;
            };
            merged += 1;
            if !object.is_dirty() {
                if object.values.is_some() {
                    object.values = Some(row.values.clone());
                }
                object.version = row.version;
                continue;
            }
            match policy {
                MergePolicy::Error => {}
                MergePolicy::ObjectTrump => object.rebase(row),
                MergePolicy::StoreTrump => {
                    let base = object.base.clone();
                    object
                        .changes
                        .retain(|property, _| row.values.get(property) == base.get(property));
                    object.base.retain(|property, _| object.changes.contains_key(property));
                    object.rebase(row);
                }
            }
        }
        for id in &receipt.deleted {
            if state.objects.remove(id).is_some() {
                merged += 1;
            }
            state.inserted.remove(id);
            state.deleted.remove(id);
        }
        debug!(context = %self.inner.label, seq = %receipt.sequence, merged, "merged changes");
    }

    /// Runs `f` on the loaded values of `id`, firing the fault if needed.
    pub(crate) fn with_values<R>(
        &self,
        id: &ObjectId,
        f: impl FnOnce(&Row) -> R,
    ) -> CoreResult<R> {
        let id = id.clone();
        let values = self.perform_and_wait(move |ctx| ctx.load_now(&id))?;
        Ok(f(&values))
    }

    fn load_now(&self, id: &ObjectId) -> CoreResult<Row> {
        let mut state = self.inner.state.lock();
        let object = match state.objects.get_mut(id) {
            Some(object) => object,
            None => return Err(CoreError::object_not_found(id.uri())),
        };
        if object.values.is_none() {
            match self.inner.store.get(id)? {
                Some(row) => {
                    object.values = Some(row.values);
                    object.version = row.version;
                }
                None => {
                    warn!(id = %id, "fault could not be fulfilled");
                    return Err(CoreError::object_not_found(id.uri()));
                }
            }
        }
        match &object.values {
            Some(values) => Ok(values.clone()),
            None => Err(CoreError::object_not_found(id.uri())),
        }
    }

    /// Sets one property, recording the change if the value differs.
    pub(crate) fn set_property(
        &self,
        id: &ObjectId,
        property: &str,
        value: Option<AttributeValue>,
    ) -> CoreResult<()> {
        let id = id.clone();
        let property = property.to_string();
        self.perform_and_wait(move |ctx| ctx.set_property_now(&id, &property, value))
    }

    fn set_property_now(
        &self,
        id: &ObjectId,
        property: &str,
        value: Option<AttributeValue>,
    ) -> CoreResult<()> {
        self.load_now(id)?;
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let inserted = state.inserted.contains(id);
        let Some(object) = state.objects.get_mut(id) else {
            return Err(CoreError::object_not_found(id.uri()));
        };
        let Some(values) = object.values.as_mut() else {
            return Err(CoreError::object_not_found(id.uri()));
        };
        if values.get(property) == value.as_ref() {
            return Ok(());
        }

        if !inserted {
            if !object.changes.contains_key(property) {
                if let Some(old) = values.get(property) {
                    object.base.insert(property.to_string(), old.clone());
                }
            }
            if object.base.get(property) == value.as_ref() {
                object.changes.remove(property);
                object.base.remove(property);
            } else {
                object.changes.insert(property.to_string(), value.clone());
            }
        }
        match value {
            Some(v) => values.insert(property.to_string(), v),
            None => values.remove(property),
        };
        state.touch();
        Ok(())
    }

    fn inspect<R, F>(&self, id: &ObjectId, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&ContextState, &ObjectId) -> R + Send + 'static,
    {
        let id = id.clone();
        self.perform_and_wait(move |ctx| {
            let state = ctx.inner.state.lock();
            f(&*state, &id)
        })
    }

    pub(crate) fn is_fault(&self, id: &ObjectId) -> bool {
        self.inspect(id, |state, id| {
            state
                .objects
                .get(id)
                .is_some_and(|object| object.values.is_none())
        })
    }

    pub(crate) fn is_inserted(&self, id: &ObjectId) -> bool {
        self.inspect(id, |state, id| state.inserted.contains(id))
    }

    pub(crate) fn is_deleted(&self, id: &ObjectId) -> bool {
        self.inspect(id, |state, id| state.deleted.contains(id))
    }

    pub(crate) fn is_dirty(&self, id: &ObjectId) -> bool {
        self.inspect(id, |state, id| {
            state.inserted.contains(id)
                || state.deleted.contains(id)
                || state.objects.get(id).is_some_and(ManagedObject::is_dirty)
        })
    }
}

fn build_change_set(state: &ContextState) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for id in &state.inserted {
        if let Some(values) = state.objects.get(id).and_then(|o| o.values.clone()) {
            changes.inserts.push((id.clone(), values));
        }
    }
    let mut updated: Vec<(&ObjectId, &ManagedObject)> = state
        .objects
        .iter()
        .filter(|(id, object)| {
            object.is_dirty() && !state.inserted.contains(*id) && !state.deleted.contains(*id)
        })
        .collect();
    updated.sort_by(|a, b| a.0.cmp(b.0));
    for (id, object) in updated {
        changes.updates.push(RowUpdate {
            id: id.clone(),
            read_version: object.version,
            base: object.base.clone(),
            changes: object.changes.clone(),
        });
    }
    changes.deletes = state.deleted.iter().cloned().collect();
    changes
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("merge_policy", &self.inner.merge_policy)
            .finish()
    }
}
