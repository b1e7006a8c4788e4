//! Query and repository laws over random data.

use proptest::prelude::*;
use shelfdb_codec::Value;
use shelfdb_core::{Config, Direction, Query, Record};
use shelfdb_testkit::prelude::*;

fn insert_all(db: &TestEngine, records: &[Record]) {
    let users = db.users();
    for record in records {
        users.insert(record.clone()).unwrap();
    }
}

fn base_query(name: Option<String>, order: Option<Direction>) -> Query {
    let mut query = Query::new();
    if let Some(name) = name {
        query = query.equals("name", name);
    }
    if let Some(direction) = order {
        query = query.order_by("age", direction);
    }
    query
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn limit_truncates_full_result(
        records in users_strategy(40),
        name in prop::option::of(name_strategy()),
        order in prop::option::of(direction_strategy()),
        limit in 1usize..20,
    ) {
        let db = TestEngine::memory();
        insert_all(&db, &records);
        let users = db.users();

        let full = users.select(&base_query(name.clone(), order)).unwrap();
        let limited = users.select(&base_query(name, order).limit(limit)).unwrap();

        prop_assert!(limited.len() <= limit);
        prop_assert_eq!(&limited[..], &full[..full.len().min(limit)]);
    }

    #[test]
    fn offset_limit_is_a_slice(
        records in users_strategy(40),
        name in prop::option::of(name_strategy()),
        order in prop::option::of(direction_strategy()),
        offset in 0usize..30,
        limit in 1usize..20,
    ) {
        let db = TestEngine::memory();
        insert_all(&db, &records);
        let users = db.users();

        let full = users.select(&base_query(name.clone(), order)).unwrap();
        let page = users
            .select(&base_query(name, order).offset(offset).limit(limit))
            .unwrap();

        let start = offset.min(full.len());
        let end = (offset + limit).min(full.len());
        prop_assert_eq!(&page[..], &full[start..end]);
    }

    #[test]
    fn order_by_is_sorted_and_stable(
        records in users_strategy(40),
        direction in direction_strategy(),
    ) {
        let db = TestEngine::memory();
        insert_all(&db, &records);

        let sorted = db.users().select(&Query::new().order_by("age", direction)).unwrap();
        for pair in sorted.windows(2) {
            let (a, b) = (pair[0].get_i64("age"), pair[1].get_i64("age"));
            match direction {
                Direction::Asc => prop_assert!(a <= b),
                Direction::Desc => prop_assert!(a >= b),
            }
            if a == b {
                prop_assert!(pair[0].get_i64("id") < pair[1].get_i64("id"));
            }
        }
    }

    #[test]
    fn index_never_changes_results(
        records in sparse_users_strategy(40),
        name in prop::option::of(name_strategy()),
        order in prop::option::of(direction_strategy()),
        limit in prop::option::of(1usize..10),
    ) {
        let indexed = TestEngine::memory();
        let scanned = TestEngine::memory_with(user_schema(), Config::new().use_indexes(false));
        insert_all(&indexed, &records);
        insert_all(&scanned, &records);

        // No name means matching users whose name is null or absent.
        let name = name.map_or(Value::Null, Value::from);
        let mut query = Query::new().equals("name", name);
        if let Some(direction) = order {
            query = query.order_by("age", direction);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        prop_assert_eq!(
            indexed.users().select(&query).unwrap(),
            scanned.users().select(&query).unwrap()
        );
    }

    #[test]
    fn put_then_get_round_trips(record in user_strategy(), key in 1i64..1000) {
        with_users(|users| {
            let stored = users.update(record.with("id", key)).unwrap();
            prop_assert_eq!(users.get(key).unwrap(), stored);

            users.delete(key).unwrap();
            prop_assert!(users.get(key).unwrap_err().is_not_found());
            Ok(())
        })?;
    }

    #[test]
    fn insert_then_get_round_trips(records in users_strategy(20)) {
        with_users(|users| {
            for record in records {
                let stored = users.insert(record.clone()).unwrap();
                let key = stored.get("id").cloned().unwrap();
                let mut expected = record;
                expected.set("id", key.clone());
                prop_assert_eq!(users.get(key).unwrap(), expected);
            }
            Ok(())
        })?;
    }
}
