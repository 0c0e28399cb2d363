//! Change sets, merge policies and commit receipts.

use crate::object_id::ObjectId;
use crate::types::SequenceNumber;
use crate::value::{AttributeValue, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted row together with the commit that last wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Property values.
    pub values: Row,
    /// Sequence number of the commit that last wrote the row.
    pub version: SequenceNumber,
}

/// How a commit resolves a property that changed in the store after the
/// committing context read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Fail the commit.
    #[default]
    Error,
    /// The committing context's value wins.
    ObjectTrump,
    /// The persisted value wins and the context's change is dropped.
    StoreTrump,
}

/// Property changes to one existing object.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    /// The object being updated.
    pub id: ObjectId,
    /// Row version the context read.
    pub read_version: SequenceNumber,
    /// Values of the changed properties as the context read them.
    /// An absent key means the property was unset.
    pub base: Row,
    /// New values. `None` clears the property.
    pub changes: BTreeMap<String, Option<AttributeValue>>,
}

impl RowUpdate {
    /// Returns the changed properties whose persisted value moved away from
    /// the value the context read.
    #[must_use]
    pub fn conflicts(&self, current: &StoredRow) -> Vec<String> {
        if current.version == self.read_version {
            return Vec::new();
        }
        self.changes
            .keys()
            .filter(|property| current.values.get(*property) != self.base.get(*property))
            .cloned()
            .collect()
    }
}

/// Everything one context save writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// New objects with their full rows.
    pub inserts: Vec<(ObjectId, Row)>,
    /// Property changes to existing objects.
    pub updates: Vec<RowUpdate>,
    /// Objects to delete.
    pub deletes: Vec<ObjectId>,
}

impl ChangeSet {
    /// Returns true if the change set writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Number of objects touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// What a commit persisted.
///
/// Contexts use receipts to refresh their registered objects, and the view
/// context merges receipts from other contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// Sequence number of the commit.
    pub sequence: SequenceNumber,
    /// Inserted objects and their persisted rows.
    pub inserted: Vec<(ObjectId, StoredRow)>,
    /// Updated objects and their rows after merging.
    pub updated: Vec<(ObjectId, StoredRow)>,
    /// Deleted objects.
    pub deleted: Vec<ObjectId>,
}

impl CommitReceipt {
    /// Returns true if the commit changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Iterates over every object whose row was written.
    pub fn written(&self) -> impl Iterator<Item = &(ObjectId, StoredRow)> {
        self.inserted.iter().chain(self.updated.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), AttributeValue::from(*v)))
            .collect()
    }

    #[test]
    fn no_conflict_when_version_unchanged() {
        let id = ObjectId::new("User");
        let update = RowUpdate {
            id,
            read_version: SequenceNumber::new(3),
            base: row(&[("firstName", "A")]),
            changes: BTreeMap::from([("firstName".to_string(), Some("B".into()))]),
        };
        let current = StoredRow {
            values: row(&[("firstName", "A")]),
            version: SequenceNumber::new(3),
        };
        assert!(update.conflicts(&current).is_empty());
    }

    #[test]
    fn conflict_only_on_moved_properties() {
        let update = RowUpdate {
            id: ObjectId::new("User"),
            read_version: SequenceNumber::new(1),
            base: row(&[("firstName", "A"), ("email", "a@x")]),
            changes: BTreeMap::from([
                ("firstName".to_string(), Some("B".into())),
                ("email".to_string(), None),
            ]),
        };
        let current = StoredRow {
            values: row(&[("firstName", "Z"), ("email", "a@x")]),
            version: SequenceNumber::new(2),
        };
        assert_eq!(update.conflicts(&current), vec!["firstName".to_string()]);
    }

    #[test]
    fn empty_change_set() {
        let mut changes = ChangeSet::default();
        assert!(changes.is_empty());
        changes.deletes.push(ObjectId::new("User"));
        assert_eq!(changes.len(), 1);
    }
}
