//! In-memory store with an optional on-disk journal.

use crate::change::{ChangeSet, CommitReceipt, MergePolicy, StoredRow};
use crate::config::{StoreConfig, StoreKind};
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JournalEntry};
use crate::model::{EntitySchema, Model};
use crate::object_id::ObjectId;
use crate::predicate::{compare_rows, FetchRequest, Predicate};
use crate::store::PersistentStore;
use crate::types::SequenceNumber;
use crate::value::Row;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

type Table = BTreeMap<ObjectId, StoredRow>;

struct StoreState {
    tables: HashMap<String, Table>,
    seq: SequenceNumber,
    journal: Option<Journal>,
    removed: bool,
}

impl StoreState {
    fn ensure_live(&self) -> StoreResult<()> {
        if self.removed {
            Err(StoreError::Removed)
        } else {
            Ok(())
        }
    }

    fn row(&self, id: &ObjectId) -> Option<&StoredRow> {
        self.tables.get(id.entity()).and_then(|t| t.get(id))
    }

    fn replay(&mut self, model: &Model, entry: JournalEntry) {
        match entry {
            JournalEntry::Commit {
                sequence,
                upserts,
                deletes,
            } => {
                for (id, values) in upserts {
                    if !model.contains(id.entity()) {
                        warn!(entity = id.entity(), "skipping journaled row of unknown entity");
                        continue;
                    }
                    self.tables.entry(id.entity().to_string()).or_default().insert(
                        id,
                        StoredRow {
                            values,
                            version: sequence,
                        },
                    );
                }
                for id in deletes {
                    if let Some(table) = self.tables.get_mut(id.entity()) {
                        table.remove(&id);
                    }
                }
                self.seq = sequence;
            }
            JournalEntry::Snapshot { sequence, rows } => {
                self.tables.clear();
                for (id, row) in rows {
                    if model.contains(id.entity()) {
                        self.tables
                            .entry(id.entity().to_string())
                            .or_default()
                            .insert(id, row);
                    }
                }
                self.seq = sequence;
            }
        }
    }
}

/// A [`PersistentStore`] keeping rows in memory.
///
/// When opened on a directory, every commit is appended to a journal before
/// it becomes visible, and the journal is replayed on the next open.
pub struct LocalStore {
    model: Model,
    state: RwLock<StoreState>,
    dir: Option<StoreDir>,
}

impl LocalStore {
    /// Opens a store described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be opened or locked, or if the journal
    /// is corrupted.
    pub fn open(model: Model, config: &StoreConfig) -> StoreResult<Self> {
        let mut state = StoreState {
            tables: HashMap::new(),
            seq: SequenceNumber::ZERO,
            journal: None,
            removed: false,
        };

        let dir = match &config.kind {
            StoreKind::InMemory => None,
            StoreKind::File(path) => {
                let dir = StoreDir::open(path, config.create_if_missing)?;
                let (journal, entries) = Journal::open(&dir.journal_path(), config.sync_on_commit)?;
                let replayed = entries.len();
                for entry in entries {
                    state.replay(&model, entry);
                }
                debug!(path = %path.display(), replayed, seq = %state.seq, "store recovered");
                state.journal = Some(journal);
                Some(dir)
            }
        };

        Ok(Self {
            model,
            state: RwLock::new(state),
            dir,
        })
    }

    /// Opens an in-memory store.
    ///
    /// # Errors
    ///
    /// Never fails for in-memory stores; the signature matches [`open`].
    ///
    /// [`open`]: LocalStore::open
    pub fn in_memory(model: Model) -> StoreResult<Self> {
        Self::open(model, &StoreConfig::in_memory())
    }

    /// Rewrites the journal as a single snapshot of the current rows.
    ///
    /// Does nothing for in-memory stores.
    pub fn checkpoint(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        state.ensure_live()?;
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let rows: Vec<(ObjectId, StoredRow)> = state
            .tables
            .values()
            .flat_map(|table| table.iter().map(|(id, row)| (id.clone(), row.clone())))
            .collect();
        let snapshot = JournalEntry::Snapshot {
            sequence: state.seq,
            rows,
        };
        if let Some(journal) = state.journal.as_mut() {
            journal.rewrite(&snapshot, &dir.journal_temp_path())?;
        }
        dir.sync()?;
        debug!(seq = %state.seq, "journal checkpointed");
        Ok(())
    }

    fn check_row(schema: &EntitySchema, row: &Row) -> StoreResult<()> {
        match row.keys().find(|property| !schema.has_property(property)) {
            Some(property) => Err(StoreError::unknown_property(schema.name(), property.as_str())),
            None => Ok(()),
        }
    }

    fn commit_locked(
        &self,
        state: &mut StoreState,
        changes: ChangeSet,
        policy: MergePolicy,
    ) -> StoreResult<CommitReceipt> {
        let sequence = state.seq.next();
        let mut upserts: Vec<(ObjectId, Row)> = Vec::new();
        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();

        for (id, values) in changes.inserts {
            let schema = self.model.entity(id.entity())?;
            Self::check_row(schema, &values)?;
            if state.row(&id).is_some() {
                return Err(StoreError::DuplicateObject { id });
            }
            upserts.push((id.clone(), values.clone()));
            inserted.push((
                id,
                StoredRow {
                    values,
                    version: sequence,
                },
            ));
        }

        for update in changes.updates {
            let schema = self.model.entity(update.id.entity())?;
            if let Some(property) = update.changes.keys().find(|p| !schema.has_property(p)) {
                return Err(StoreError::unknown_property(schema.name(), property.as_str()));
            }
            let Some(current) = state.row(&update.id) else {
                if policy == MergePolicy::Error {
                    return Err(StoreError::ObjectNotFound { id: update.id });
                }
                debug!(id = %update.id, "update to deleted object dropped");
                continue;
            };

            let conflicts = update.conflicts(current);
            if !conflicts.is_empty() {
                debug!(id = %update.id, ?conflicts, ?policy, "merge conflict");
                if policy == MergePolicy::Error {
                    return Err(StoreError::Conflict {
                        id: update.id,
                        properties: conflicts,
                    });
                }
            }

            let mut values = current.values.clone();
            let mut applied = 0usize;
            for (property, value) in update.changes {
                if policy == MergePolicy::StoreTrump && conflicts.contains(&property) {
                    continue;
                }
                match value {
                    Some(v) => values.insert(property, v),
                    None => values.remove(&property),
                };
                applied += 1;
            }

            if applied == 0 {
                updated.push((update.id, current.clone()));
                continue;
            }
            upserts.push((update.id.clone(), values.clone()));
            updated.push((
                update.id,
                StoredRow {
                    values,
                    version: sequence,
                },
            ));
        }

        for id in changes.deletes {
            if state.row(&id).is_some() {
                deleted.push(id);
            }
        }

        if let Some(journal) = state.journal.as_mut() {
            journal.append(&JournalEntry::Commit {
                sequence,
                upserts,
                deletes: deleted.clone(),
            })?;
        }

        for (id, row) in inserted.iter().chain(updated.iter()) {
            state
                .tables
                .entry(id.entity().to_string())
                .or_default()
                .insert(id.clone(), row.clone());
        }
        for id in &deleted {
            if let Some(table) = state.tables.get_mut(id.entity()) {
                table.remove(id);
            }
        }
        state.seq = sequence;

        debug!(
            %sequence,
            inserted = inserted.len(),
            updated = updated.len(),
            deleted = deleted.len(),
            "commit applied"
        );
        Ok(CommitReceipt {
            sequence,
            inserted,
            updated,
            deleted,
        })
    }
}

impl PersistentStore for LocalStore {
    fn model(&self) -> &Model {
        &self.model
    }

    fn fetch(&self, request: &FetchRequest) -> StoreResult<Vec<(ObjectId, StoredRow)>> {
        self.model.entity(&request.entity)?;
        let state = self.state.read();
        state.ensure_live()?;

        let mut rows: Vec<(ObjectId, StoredRow)> = state
            .tables
            .get(&request.entity)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, row)| request.matches(&row.values))
                    .map(|(id, row)| (id.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|(a_id, a), (b_id, b)| {
            compare_rows(&a.values, &b.values, &request.sort).then_with(|| a_id.cmp(b_id))
        });
        if request.limit > 0 {
            rows.truncate(request.limit);
        }
        Ok(rows)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredRow>> {
        let state = self.state.read();
        state.ensure_live()?;
        Ok(state.row(id).cloned())
    }

    fn count(&self, entity: &str, predicate: Option<&Predicate>) -> StoreResult<usize> {
        self.model.entity(entity)?;
        let state = self.state.read();
        state.ensure_live()?;
        Ok(state.tables.get(entity).map_or(0, |table| {
            table
                .values()
                .filter(|row| predicate.map_or(true, |p| p.evaluate(&row.values)))
                .count()
        }))
    }

    fn commit(&self, changes: ChangeSet, policy: MergePolicy) -> StoreResult<CommitReceipt> {
        let mut state = self.state.write();
        state.ensure_live()?;
        self.commit_locked(&mut state, changes, policy)
    }

    fn batch_delete(
        &self,
        entity: &str,
        predicate: Option<&Predicate>,
    ) -> StoreResult<CommitReceipt> {
        self.model.entity(entity)?;
        let mut state = self.state.write();
        state.ensure_live()?;
        let deletes: Vec<ObjectId> = state
            .tables
            .get(entity)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, row)| predicate.map_or(true, |p| p.evaluate(&row.values)))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let changes = ChangeSet {
            deletes,
            ..ChangeSet::default()
        };
        self.commit_locked(&mut state, changes, MergePolicy::Error)
    }

    fn committed_seq(&self) -> SequenceNumber {
        self.state.read().seq
    }

    fn destroy(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        state.tables.clear();
        state.journal = None;
        state.removed = true;
        if let Some(dir) = &self.dir {
            dir.remove_journal()?;
        }
        debug!("store destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("seq", &self.committed_seq())
            .field("journaled", &self.dir.is_some())
            .finish()
    }
}
