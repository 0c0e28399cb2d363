//! Property tests for the list and mapping transformers.

use objsync_codec::{ListTransformer, MapTransformer, ValueTransformer};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for JSON leaves. Floats are left out because JSON text does not
/// promise bit-exact float round trips.
fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        "[a-zA-Z0-9 _\\-\u{e9}\u{4e2d}]{0,16}".prop_map(Value::String),
    ]
}

fn json_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

proptest! {
    #[test]
    fn list_decode_inverts_encode(items in prop::collection::vec(json_strategy(), 0..10)) {
        let value = Value::Array(items);
        let bytes = ListTransformer.transform(&value).expect("list encodes");
        prop_assert_eq!(ListTransformer.reverse_transform(&bytes), Some(value));
    }

    #[test]
    fn map_decode_inverts_encode(entries in prop::collection::btree_map("[a-z]{1,10}", json_strategy(), 0..10)) {
        let value = Value::Object(entries.into_iter().collect());
        let bytes = MapTransformer.transform(&value).expect("map encodes");
        prop_assert_eq!(MapTransformer.reverse_transform(&bytes), Some(value));
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = ListTransformer.reverse_transform(&bytes);
        let _ = MapTransformer.reverse_transform(&bytes);
    }

    #[test]
    fn scalars_are_rejected(leaf in leaf_strategy()) {
        prop_assert!(ListTransformer.transform(&leaf).is_none());
        prop_assert!(MapTransformer.transform(&leaf).is_none());
    }
}
