//! Integration tests for the local store.

use objsync_store::{
    AttributeType, AttributeValue, ChangeSet, EntitySchema, FetchRequest, LocalStore,
    MergePolicy, Model, ObjectId, PersistentStore, Predicate, Row, SequenceNumber, StoreConfig,
    StoreError,
};
use proptest::prelude::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn model() -> Model {
    Model::builder()
        .entity(
            EntitySchema::new("Item")
                .attribute("name", AttributeType::String)
                .attribute("rank", AttributeType::Integer)
                .to_many("children", "Item"),
        )
        .build()
        .unwrap()
}

fn item(name: &str, rank: i64) -> (ObjectId, Row) {
    let mut row = Row::new();
    row.insert("name".into(), AttributeValue::from(name));
    row.insert("rank".into(), AttributeValue::Integer(rank));
    (ObjectId::new("Item"), row)
}

fn insert_all(store: &LocalStore, items: Vec<(ObjectId, Row)>) {
    let changes = ChangeSet {
        inserts: items,
        ..ChangeSet::default()
    };
    store.commit(changes, MergePolicy::Error).unwrap();
}

#[test]
fn concurrent_commits_get_distinct_sequences() {
    let store = Arc::new(LocalStore::in_memory(model()).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    insert_all(&store, vec![item(&format!("t{t}-{i}"), i)]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.count("Item", None).unwrap(), 200);
    assert_eq!(store.committed_seq(), SequenceNumber::new(200));
}

#[test]
fn rows_carry_the_sequence_that_wrote_them() {
    let store = LocalStore::in_memory(model()).unwrap();
    insert_all(&store, vec![item("a", 1), item("b", 2)]);
    insert_all(&store, vec![item("c", 3)]);

    let rows = store
        .fetch(&FetchRequest::new("Item").sort_by("rank", true))
        .unwrap();
    let versions: Vec<u64> = rows.iter().map(|(_, r)| r.version.as_u64()).collect();
    assert_eq!(versions, vec![1, 1, 2]);
}

#[test]
fn relationships_are_stored_as_references() {
    let store = LocalStore::in_memory(model()).unwrap();
    let (child_id, child) = item("child", 1);
    let (parent_id, mut parent) = item("parent", 0);
    parent.insert(
        "children".into(),
        AttributeValue::References(vec![child_id.clone()]),
    );
    insert_all(&store, vec![(child_id.clone(), child), (parent_id.clone(), parent)]);

    let stored = store.get(&parent_id).unwrap().unwrap();
    assert_eq!(
        stored.values["children"].as_references(),
        Some(&[child_id][..])
    );
}

#[test]
fn garbage_journal_is_reported() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("store");
    std::fs::create_dir_all(&path).unwrap();
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path.join("journal.log"))
        .unwrap();
    file.write_all(b"definitely not a journal frame").unwrap();
    drop(file);

    let result = LocalStore::open(model(), &StoreConfig::file(&path));
    assert!(matches!(result, Err(StoreError::Corrupted { .. })));
}

#[test]
fn second_open_is_locked() {
    let temp = tempdir().unwrap();
    let config = StoreConfig::file(temp.path().join("store"));
    let _first = LocalStore::open(model(), &config).unwrap();
    assert!(matches!(
        LocalStore::open(model(), &config),
        Err(StoreError::Locked)
    ));
}

proptest! {
    #[test]
    fn fetch_respects_predicate_sort_and_limit(
        ranks in prop::collection::vec(0i64..20, 1..40),
        wanted in 0i64..20,
        limit in 0usize..5,
    ) {
        let store = LocalStore::in_memory(model()).unwrap();
        let items = ranks.iter().enumerate().map(|(i, r)| item(&format!("n{i}"), *r)).collect();
        insert_all(&store, items);

        let all = store.fetch(&FetchRequest::new("Item").sort_by("rank", false)).unwrap();
        let got: Vec<i64> = all.iter().map(|(_, r)| r.values["rank"].as_i64().unwrap()).collect();
        let mut expected = ranks.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        prop_assert_eq!(got, expected);

        let request = FetchRequest::new("Item")
            .predicate(Predicate::equals("rank", wanted))
            .limit(limit);
        let matching = ranks.iter().filter(|r| **r == wanted).count();
        let expected_len = if limit == 0 { matching } else { matching.min(limit) };
        prop_assert_eq!(store.fetch(&request).unwrap().len(), expected_len);
        prop_assert_eq!(
            store.count("Item", Some(&Predicate::equals("rank", wanted))).unwrap(),
            matching
        );
    }
}
