//! Create-or-update synchronization of JSON payloads.
//!
//! [`SyncEngine::sync`] unwraps the payload according to the entity's
//! binding, then for each element either updates the object its primary key
//! matches or inserts a new one. Related entities are populated by the
//! descriptor's hook inside the same context, and the context is saved once.

use crate::context::Context;
use crate::error::CoreResult;
use crate::key::match_predicate;
use crate::record::Record;
use crate::registry::{Binding, Registry};
use crate::stack::DataStack;
use objsync_codec::shape_name;
use objsync_store::FetchRequest;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync calls that received a payload.
    pub calls: u64,
    /// Objects inserted, including related objects.
    pub inserted: u64,
    /// Existing objects updated, including related objects.
    pub updated: u64,
    /// List elements that were not JSON objects.
    pub skipped_elements: u64,
    /// Payloads whose shape could not be synchronized.
    pub unhandled_payloads: u64,
    /// When the last sync call finished.
    pub last_sync_time: Option<Instant>,
}

/// Elements extracted from a payload.
enum Shape {
    Unhandled,
    Single(Map<String, Value>),
    List(Vec<Value>),
}

fn classify(binding: &Binding, payload: &Value) -> Shape {
    let target = match binding.mapped_to_element() {
        None => payload,
        Some(key) => match payload.get(key) {
            Some(value) => value,
            None => {
                warn!(entity = binding.entity(), element = key, "mapped element missing from payload");
                return Shape::Unhandled;
            }
        },
    };
    match target {
        Value::Object(element) => Shape::Single(element.clone()),
        Value::Array(items) if !items.is_empty() && binding.mapped_to_element().is_some() => {
            Shape::List(items.clone())
        }
        other => {
            warn!(
                entity = binding.entity(),
                shape = shape_name(other),
                "payload is neither an object nor a non-empty list"
            );
            Shape::Unhandled
        }
    }
}

/// What one sync call did.
#[derive(Debug, Default)]
struct Outcome {
    records: Vec<Record>,
    inserted: u64,
    updated: u64,
    skipped: u64,
    unhandled: bool,
}

/// Synchronizes JSON payloads into a [`DataStack`] using registered
/// descriptors.
pub struct SyncEngine {
    stack: Arc<DataStack>,
    registry: Arc<Registry>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    /// Creates an engine over `stack` using the descriptors in `registry`.
    #[must_use]
    pub fn new(stack: Arc<DataStack>, registry: Arc<Registry>) -> Self {
        Self {
            stack,
            registry,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the data stack.
    #[must_use]
    pub fn stack(&self) -> &Arc<DataStack> {
        &self.stack
    }

    /// Returns the descriptor registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns a copy of the counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Synchronizes `payload` into a fresh background context and saves it.
    ///
    /// Returns `None` for an absent payload and an empty list for a payload
    /// whose shape does not fit the entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntity`](crate::CoreError::UnknownEntity)
    /// for unregistered entities and propagates store failures from the
    /// save.
    pub fn sync(&self, entity: &str, payload: Option<&Value>) -> CoreResult<Option<Vec<Record>>> {
        let Some(payload) = payload else {
            debug!(entity, "no payload to synchronize");
            return Ok(None);
        };
        let binding = self.registry.binding(entity)?;
        let context = self.stack.background_context()?;
        let outcome = self.run(&context, binding, payload, true)?;
        Ok(Some(self.record(entity, outcome)))
    }

    /// Synchronizes `payload` inside `context` without saving it.
    ///
    /// Several calls can share one context and be committed together with
    /// [`Context::save`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntity`](crate::CoreError::UnknownEntity)
    /// for unregistered entities and propagates store failures from the
    /// key lookups.
    pub fn sync_in(
        &self,
        context: &Context,
        entity: &str,
        payload: Option<&Value>,
    ) -> CoreResult<Option<Vec<Record>>> {
        let Some(payload) = payload else {
            debug!(entity, "no payload to synchronize");
            return Ok(None);
        };
        let binding = self.registry.binding(entity)?;
        let outcome = self.run(context, binding, payload, false)?;
        Ok(Some(self.record(entity, outcome)))
    }

    fn run(
        &self,
        context: &Context,
        binding: Arc<Binding>,
        payload: &Value,
        save: bool,
    ) -> CoreResult<Outcome> {
        let shape = classify(&binding, payload);
        let registry = Arc::clone(&self.registry);
        context.perform_and_wait(move |ctx| {
            let scope = SyncScope::new(ctx.clone(), registry);
            let mut outcome = Outcome::default();
            match shape {
                Shape::Unhandled => outcome.unhandled = true,
                Shape::Single(element) => {
                    outcome.records.push(scope.upsert(&binding, &element)?);
                }
                Shape::List(items) => {
                    for (index, item) in items.iter().enumerate() {
                        match item {
                            Value::Object(element) => {
                                outcome.records.push(scope.upsert(&binding, element)?);
                            }
                            other => {
                                warn!(
                                    entity = binding.entity(),
                                    index,
                                    shape = shape_name(other),
                                    "list element is not an object; skipped"
                                );
                                outcome.skipped += 1;
                            }
                        }
                    }
                }
            }
            if save && !outcome.records.is_empty() {
                ctx.save()?;
            }
            outcome.inserted = scope.inserted.get();
            outcome.updated = scope.updated.get();
            Ok(outcome)
        })
    }

    fn record(&self, entity: &str, outcome: Outcome) -> Vec<Record> {
        let mut stats = self.stats.write();
        stats.calls += 1;
        stats.inserted += outcome.inserted;
        stats.updated += outcome.updated;
        stats.skipped_elements += outcome.skipped;
        stats.unhandled_payloads += u64::from(outcome.unhandled);
        stats.last_sync_time = Some(Instant::now());
        debug!(
            entity,
            records = outcome.records.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            "payload synchronized"
        );
        outcome.records
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("entities", &self.registry.names().collect::<Vec<_>>())
            .field("stats", &self.stats())
            .finish()
    }
}

/// The context a synchronization runs in, handed to related-entity hooks.
///
/// Everything a hook creates through the scope joins the same transaction as
/// the record that triggered it.
pub struct SyncScope {
    context: Context,
    registry: Arc<Registry>,
    inserted: Cell<u64>,
    updated: Cell<u64>,
}

impl SyncScope {
    fn new(context: Context, registry: Arc<Registry>) -> Self {
        Self {
            context,
            registry,
            inserted: Cell::new(0),
            updated: Cell::new(0),
        }
    }

    /// Returns the context the sync runs in.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the descriptor registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Creates a new `entity` object from `element` without looking for an
    /// existing one, then runs the entity's hook.
    pub fn insert(&self, entity: &str, element: &Map<String, Value>) -> CoreResult<Record> {
        let binding = self.registry.binding(entity)?;
        self.create(&binding, element)
    }

    /// Updates the `entity` object `element`'s key matches, or creates one.
    pub fn insert_or_update(
        &self,
        entity: &str,
        element: &Map<String, Value>,
    ) -> CoreResult<Record> {
        let binding = self.registry.binding(entity)?;
        self.upsert(&binding, element)
    }

    fn upsert(&self, binding: &Binding, element: &Map<String, Value>) -> CoreResult<Record> {
        match self.find_and_update(binding, element)? {
            Some(record) => {
                self.populate_related(binding, &record, element);
                Ok(record)
            }
            None => self.create(binding, element),
        }
    }

    /// Applies `element` to the first object its key matches, in the
    /// entity's default sort order.
    fn find_and_update(
        &self,
        binding: &Binding,
        element: &Map<String, Value>,
    ) -> CoreResult<Option<Record>> {
        let Some(predicate) = match_predicate(binding, element) else {
            return Ok(None);
        };
        let sort = binding.sort();
        let request = FetchRequest::new(binding.entity())
            .predicate(predicate)
            .sort_by(sort.key.as_str(), sort.ascending)
            .limit(1);
        let Some(record) = self.context.fetch(request)?.into_iter().next() else {
            return Ok(None);
        };
        apply_element(binding, &record, element, true)?;
        self.updated.set(self.updated.get() + 1);
        Ok(Some(record))
    }

    fn create(&self, binding: &Binding, element: &Map<String, Value>) -> CoreResult<Record> {
        let record = self.context.insert(binding.entity())?;
        apply_element(binding, &record, element, false)?;
        self.inserted.set(self.inserted.get() + 1);
        self.populate_related(binding, &record, element);
        Ok(record)
    }

    fn populate_related(&self, binding: &Binding, record: &Record, element: &Map<String, Value>) {
        if let Err(e) = binding
            .descriptor()
            .insert_related_entities(record, element, self)
        {
            warn!(entity = binding.entity(), error = %e, "related entities not populated");
        }
    }
}

impl std::fmt::Debug for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScope")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Writes the mapped elements present in `element` onto `record`.
///
/// Key properties are left alone when updating a matched object.
fn apply_element(
    binding: &Binding,
    record: &Record,
    element: &Map<String, Value>,
    skip_key: bool,
) -> CoreResult<()> {
    for (key, property) in binding.mapping() {
        if skip_key && binding.primary_key().contains_property(property) {
            continue;
        }
        if let Some(raw) = element.get(key) {
            record.set_json(property, raw)?;
        }
    }
    for key in element.keys() {
        if !binding.mapping().iter().any(|(mapped, _)| mapped == key) {
            debug!(entity = binding.entity(), element = %key, "unmapped element ignored");
        }
    }
    Ok(())
}
