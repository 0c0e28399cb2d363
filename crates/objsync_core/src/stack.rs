//! The data stack: one store, one view context, any number of background
//! contexts.

use crate::config::StackConfig;
use crate::context::{CommitHook, Context, ContextKind};
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use objsync_codec::{CodecError, TransformerRegistry, ValueTransformer};
use objsync_store::{
    CommitReceipt, FetchRequest, LocalStore, Model, ObjectId, PersistentStore, Predicate,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

enum StoreSource {
    Model(Model),
    Store(Arc<dyn PersistentStore>),
}

/// Builds a [`DataStack`].
///
/// A stack only exists fully initialized: [`open`](Self::open) opens the
/// store, resolves every transformer the model names and creates the view
/// context on the calling thread.
#[must_use]
pub struct DataStackBuilder {
    source: StoreSource,
    config: StackConfig,
    transformers: Vec<Arc<dyn ValueTransformer>>,
}

impl DataStackBuilder {
    /// Starts a stack over a [`LocalStore`] opened from `model` and the
    /// configured [`StoreConfig`](objsync_store::StoreConfig).
    pub fn new(model: Model) -> Self {
        Self {
            source: StoreSource::Model(model),
            config: StackConfig::default(),
            transformers: Vec::new(),
        }
    }

    /// Starts a stack over an already opened store.
    pub fn with_store(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            source: StoreSource::Store(store),
            config: StackConfig::default(),
            transformers: Vec::new(),
        }
    }

    /// Sets the stack configuration.
    pub fn config(mut self, config: StackConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a transformer in addition to the built-in ones.
    pub fn transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Opens the stack. The calling thread owns the view context.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be opened or a transformable attribute
    /// names a transformer that is not registered.
    pub fn open(self) -> CoreResult<DataStack> {
        let transformers = TransformerRegistry::with_defaults();
        for transformer in self.transformers {
            transformers.register(transformer);
        }

        let store: Arc<dyn PersistentStore> = match self.source {
            StoreSource::Model(model) => Arc::new(LocalStore::open(model, &self.config.store)?),
            StoreSource::Store(store) => store,
        };
        for name in store.model().transformer_names() {
            if !transformers.contains(name) {
                return Err(CodecError::unknown_transformer(name).into());
            }
        }

        let transformers = Arc::new(transformers);
        let view = Context::new(
            ContextKind::View,
            format!("{}.view", self.config.queue_label),
            self.config.view_merge_policy,
            Arc::clone(&store),
            Arc::clone(&transformers),
            None,
        )?;
        info!(
            entities = store.model().entities().count(),
            seq = %store.committed_seq(),
            "data stack opened"
        );
        Ok(DataStack {
            config: self.config,
            store,
            transformers,
            view,
            background_count: AtomicU64::new(0),
        })
    }
}

/// Owns the persistent store and hands out contexts.
///
/// ```
/// use objsync_core::DataStackBuilder;
/// use objsync_store::{AttributeType, EntitySchema, FetchRequest, Model};
///
/// let model = Model::builder()
///     .entity(EntitySchema::new("Note").attribute("title", AttributeType::String))
///     .build()
///     .unwrap();
/// let stack = DataStackBuilder::new(model).open().unwrap();
///
/// let context = stack.background_context().unwrap();
/// let note = stack.add_record("Note", Some(&context)).unwrap();
/// note.set_value("title", Some("hello".into())).unwrap();
/// stack.save(&context).unwrap();
///
/// let notes = stack.query(FetchRequest::new("Note"), None).unwrap();
/// assert_eq!(notes[0].string("title").unwrap().as_deref(), Some("hello"));
/// ```
pub struct DataStack {
    config: StackConfig,
    store: Arc<dyn PersistentStore>,
    transformers: Arc<TransformerRegistry>,
    view: Context,
    background_count: AtomicU64,
}

impl DataStack {
    /// Returns the stack configuration.
    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    /// Returns the model.
    #[must_use]
    pub fn model(&self) -> &Model {
        self.store.model()
    }

    /// Returns the transformer registry.
    #[must_use]
    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    /// Returns the view context.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread other than the one that opened the
    /// stack or the view context's queue.
    #[must_use]
    pub fn view_context(&self) -> &Context {
        self.view.assert_confined();
        &self.view
    }

    /// Creates a background context owned by the calling thread.
    ///
    /// Its commits are merged into the view context when
    /// [`automatically_merges_changes`](StackConfig::automatically_merges_changes)
    /// is set.
    ///
    /// # Errors
    ///
    /// Fails if the context's queue thread cannot be spawned.
    pub fn background_context(&self) -> CoreResult<Context> {
        let n = self.background_count.fetch_add(1, Ordering::Relaxed);
        let hook: Option<CommitHook> = if self.config.automatically_merges_changes {
            let view = self.view.clone();
            Some(Arc::new(move |receipt: &CommitReceipt| view.merge_changes(receipt)))
        } else {
            None
        };
        Context::new(
            ContextKind::Background,
            format!("{}.background.{n}", self.config.queue_label),
            self.config.background_merge_policy,
            Arc::clone(&self.store),
            Arc::clone(&self.transformers),
            hook,
        )
    }

    /// Runs `task` on a fresh background context's queue without waiting.
    ///
    /// # Errors
    ///
    /// Fails like [`background_context`](Self::background_context).
    pub fn perform_background_task<F>(&self, task: F) -> CoreResult<()>
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        let context = self.background_context()?;
        context.perform(task);
        Ok(())
    }

    fn resolve<'a>(&'a self, context: Option<&'a Context>) -> &'a Context {
        context.unwrap_or_else(|| self.view_context())
    }

    /// Fetches records in `context`, or in the view context.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the fetch.
    pub fn query(&self, request: FetchRequest, context: Option<&Context>) -> CoreResult<Vec<Record>> {
        self.resolve(context).fetch(request)
    }

    /// Fetches on the context's queue and hands the result to `completion`
    /// there. The completion runs exactly once.
    pub fn async_query<F>(&self, request: FetchRequest, context: Option<&Context>, completion: F)
    where
        F: FnOnce(CoreResult<Vec<Record>>) + Send + 'static,
    {
        self.resolve(context)
            .perform(move |ctx| completion(ctx.fetch(request)));
    }

    /// Counts matching objects, including the context's pending changes.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the fetch.
    pub fn count(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        context: Option<&Context>,
    ) -> CoreResult<usize> {
        self.resolve(context).count(entity, predicate)
    }

    /// Creates an unsaved record in `context`, or in the view context.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the model has no such entity.
    pub fn add_record(&self, entity: &str, context: Option<&Context>) -> CoreResult<Record> {
        self.resolve(context).insert(entity)
    }

    /// Deletes every matching record through the context, optionally saving.
    ///
    /// # Errors
    ///
    /// Fails if the fetch fails or, with `should_save`, if the save fails.
    pub fn delete_records(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        context: &Context,
        should_save: bool,
    ) -> CoreResult<()> {
        let request = FetchRequest::new(entity).maybe_predicate(predicate);
        let deleted = context.perform_and_wait(move |ctx| {
            let records = ctx.fetch(request)?;
            for record in &records {
                ctx.delete(record)?;
            }
            if should_save {
                ctx.save()?;
            }
            Ok::<_, CoreError>(records.len())
        })?;
        debug!(entity, deleted, should_save, "records deleted");
        Ok(())
    }

    /// Deletes every matching row directly in the store, without loading
    /// objects, then merges the deletion into `context` and the view context.
    ///
    /// With `should_save` the context's other pending changes are saved too.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the delete or, with `should_save`, the
    /// save.
    pub fn delete_batch(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        context: &Context,
        should_save: bool,
    ) -> CoreResult<()> {
        context.assert_confined();
        let receipt = self.store.batch_delete(entity, predicate.as_ref())?;
        context.merge_changes(&receipt);
        if !context.same_context(&self.view) {
            self.view.merge_changes(&receipt);
        }
        debug!(entity, deleted = receipt.deleted.len(), seq = %receipt.sequence, "batch delete");
        if should_save {
            context.save()?;
        }
        Ok(())
    }

    /// Saves the context.
    ///
    /// # Errors
    ///
    /// Fails like [`Context::save`].
    pub fn save(&self, context: &Context) -> CoreResult<()> {
        context.save()
    }

    /// Resolves a durable reference produced by [`Record::object_uri`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidObjectUri`] for malformed references and
    /// [`CoreError::ObjectNotFound`] when the object no longer exists.
    pub fn record_from_uri(&self, uri: &str, context: Option<&Context>) -> CoreResult<Record> {
        let id = ObjectId::from_uri(uri).ok_or_else(|| CoreError::InvalidObjectUri {
            uri: uri.to_string(),
        })?;
        if !self.store.model().contains(id.entity()) {
            return Err(CoreError::unknown_entity(id.entity()));
        }
        self.resolve(context).object(&id)
    }

    /// Deletes all persisted data. The stack is unusable afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the store files cannot be removed.
    pub fn remove_store(&self) -> CoreResult<()> {
        self.store.destroy()?;
        info!("store removed");
        Ok(())
    }
}

impl std::fmt::Debug for DataStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStack")
            .field("committed_seq", &self.store.committed_seq())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}
