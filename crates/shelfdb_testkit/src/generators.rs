//! Property-based test generators using proptest.

use crate::fixtures::user;
use proptest::prelude::*;
use shelfdb_codec::Value;
use shelfdb_core::{Direction, Record};

/// Strategy for user names drawn from a small pool, so equality filters
/// and sort ties actually happen.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Marcus", "Lucius", "Julia", "Livia", "Gaius"])
        .prop_map(String::from)
}

/// Strategy for ages with plenty of duplicates.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..60
}

/// Strategy for a keyless user record.
pub fn user_strategy() -> impl Strategy<Value = Record> {
    (name_strategy(), age_strategy()).prop_map(|(name, age)| user(&name, age))
}

/// Strategy for a batch of keyless users.
pub fn users_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(user_strategy(), 0..max)
}

/// Strategy for a keyless user whose name may also be null or absent.
pub fn sparse_user_strategy() -> impl Strategy<Value = Record> {
    (
        prop::option::weighted(0.7, name_strategy()),
        any::<bool>(),
        age_strategy(),
    )
        .prop_map(|(name, explicit_null, age)| match name {
            Some(name) => user(&name, age),
            None if explicit_null => Record::new().with("name", Value::Null).with("age", age),
            None => Record::new().with("age", age),
        })
}

/// Strategy for a batch of keyless users with sparse names.
pub fn sparse_users_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(sparse_user_strategy(), 0..max)
}

/// Strategy for a sort direction.
pub fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Asc), Just(Direction::Desc)]
}

/// Strategy for scalar field values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z]{0,12}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

/// Strategy for nested values up to a few levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}
