//! End-to-end user collection scenarios.

use shelfdb_core::{
    CollectionDef, CoreError, Direction, Engine, FieldDef, Query, Record, Repository, Schema,
};
use shelfdb_storage::LocalEngine;
use std::sync::Arc;

fn user_schema() -> Schema {
    Schema::define([(
        "user",
        CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("name", FieldDef::string())
            .field("age", FieldDef::integer()),
    )])
    .unwrap()
}

/// Two users inserted into a fresh database.
fn seeded() -> Repository {
    let engine =
        Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, user_schema()).unwrap();
    let users = engine.repository("user").unwrap();
    users
        .insert(Record::new().with("name", "Marcus").with("age", 30))
        .unwrap();
    users
        .insert(Record::new().with("name", "Lucius").with("age", 20))
        .unwrap();
    users
}

#[test]
fn select_all_keeps_insertion_order() {
    let users = seeded();
    let all = users.select(&Query::new()).unwrap();

    assert_eq!(all.len(), 2);
    assert_eq!(all[0].get_i64("id"), Some(1));
    assert_eq!(all[0].get_str("name"), Some("Marcus"));
    assert_eq!(all[1].get_i64("id"), Some(2));
    assert_eq!(all[1].get_str("name"), Some("Lucius"));
}

#[test]
fn order_by_age_descending() {
    let users = seeded();
    let sorted = users
        .select(&Query::new().order_by("age", Direction::Desc))
        .unwrap();

    let names: Vec<_> = sorted.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec!["Marcus", "Lucius"]);
}

#[test]
fn update_by_key_increments_age() {
    let users = seeded();
    users
        .update_by_key(1, |mut r| {
            let age = r.get_i64("age").unwrap_or(0);
            r.set("age", age + 1);
            Ok(r)
        })
        .unwrap();
    assert_eq!(users.get(1).unwrap().get_i64("age"), Some(31));

    let err = users.update_by_key(99, Ok).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn equals_finds_one_record() {
    let users = seeded();
    let found = users
        .select(&Query::new().equals("name", "Marcus"))
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_i64("age"), Some(30));
}

#[test]
fn duplicate_explicit_id_conflicts() {
    let engine =
        Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, user_schema()).unwrap();
    let users = engine.repository("user").unwrap();
    let record = Record::new().with("id", 1).with("name", "Marcus").with("age", 30);

    users.insert(record.clone()).unwrap();
    let err = users.insert(record).unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));
    assert_eq!(users.count().unwrap(), 1);
}

#[test]
fn insert_get_round_trip_and_delete() {
    let users = seeded();
    let stored = users
        .insert(Record::new().with("name", "Julia").with("age", 25))
        .unwrap();
    let key = stored.get("id").cloned().unwrap();

    assert_eq!(users.get(key.clone()).unwrap(), stored);

    users.delete(key.clone()).unwrap();
    assert!(users.get(key).unwrap_err().is_not_found());
}

#[test]
fn explicit_ids_move_the_counter() {
    let users = seeded();
    users
        .insert(Record::new().with("id", 10).with("name", "Julia"))
        .unwrap();
    let next = users.insert(Record::new().with("name", "Livia")).unwrap();
    assert_eq!(next.get_i64("id"), Some(11));
}

#[test]
fn operations_before_open_fail() {
    let engine = Arc::new(Engine::new(
        Arc::new(LocalEngine::in_memory()),
        "app",
        1,
        user_schema(),
    ));
    let users = engine.repository("user").unwrap();
    assert!(matches!(
        users.insert(Record::new().with("name", "Marcus")),
        Err(CoreError::NotConnected { .. })
    ));

    engine.open().unwrap();
    users.insert(Record::new().with("name", "Marcus")).unwrap();
}
