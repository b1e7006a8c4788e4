//! Concurrent writers and readers.

use shelfdb_core::{CollectionDef, Engine, FieldDef, Query, Record, Repository, Schema, TxMode};
use shelfdb_storage::LocalEngine;
use std::sync::{Arc, Barrier};
use std::thread;

fn counters() -> Repository {
    let schema = Schema::define([(
        "counter",
        CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("value", FieldDef::integer()),
    )])
    .unwrap();
    let engine = Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema).unwrap();
    let repo = engine.repository("counter").unwrap();
    repo.insert(Record::new().with("value", 0)).unwrap();
    repo
}

fn increment(repo: &Repository) {
    repo.update_by_key(1, |mut r| {
        let value = r.get_i64("value").unwrap_or(0);
        r.set("value", value + 1);
        Ok(r)
    })
    .unwrap();
}

#[test]
fn two_concurrent_increments_both_land() {
    let repo = counters();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let repo = repo.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                increment(&repo);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.get(1).unwrap().get_i64("value"), Some(2));
}

#[test]
fn many_increments_never_lose_updates() {
    let repo = counters();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    increment(&repo);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.get(1).unwrap().get_i64("value"), Some(200));
}

#[test]
fn reader_sees_stable_snapshot() {
    let repo = counters();
    for _ in 0..4 {
        repo.insert(Record::new().with("value", 0)).unwrap();
    }

    let engine = Arc::clone(repo.engine());
    let mut reader = engine.begin(&["counter"], TxMode::ReadOnly).unwrap();
    let before = reader.select("counter", &Query::new()).unwrap();

    repo.clear().unwrap();
    increment_missing_is_not_found(&repo);

    let during = reader.select("counter", &Query::new()).unwrap();
    assert_eq!(before, during);
    reader.commit().unwrap();

    assert_eq!(repo.count().unwrap(), 0);
}

fn increment_missing_is_not_found(repo: &Repository) {
    let err = repo.update_by_key(1, Ok).unwrap_err();
    assert!(err.is_not_found());
}
