//! Repository: one collection bound to an engine.

use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::record::Record;
use shelfdb_codec::Value;
use shelfdb_storage::TxMode;
use std::fmt;
use std::sync::Arc;

/// Record operations on one collection.
///
/// Each call runs in its own transaction and is visible to others only
/// once that transaction commits. Repositories are cheap to clone and
/// can be shared across threads.
#[derive(Clone)]
pub struct Repository {
    engine: Arc<Engine>,
    collection: String,
}

impl Repository {
    /// Binds `collection` of `engine`.
    ///
    /// # Errors
    ///
    /// Fails with `Query` if the schema has no such collection.
    pub fn new(engine: Arc<Engine>, collection: impl Into<String>) -> CoreResult<Self> {
        let collection = collection.into();
        engine.schema().require(&collection)?;
        Ok(Self { engine, collection })
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The engine this repository writes through.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn primary_key(&self) -> CoreResult<&str> {
        Ok(self.engine.schema().require(&self.collection)?.primary_key())
    }

    /// Inserts a record and returns it with its assigned key.
    ///
    /// # Errors
    ///
    /// Fails with `Conflict` if a record with the same key exists.
    pub fn insert(&self, record: Record) -> CoreResult<Record> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadWrite, |ctx| ctx.add(name, record))
    }

    /// Returns the record with `key`, if any.
    pub fn find(&self, key: impl Into<Value>) -> CoreResult<Option<Record>> {
        let key = key.into();
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadOnly, |ctx| ctx.get(name, &key))
    }

    /// Returns the record with `key`.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if there is none.
    pub fn get(&self, key: impl Into<Value>) -> CoreResult<Record> {
        let key = key.into();
        self.find(key.clone())?
            .ok_or_else(|| CoreError::not_found(&self.collection, key))
    }

    /// Returns every record in key order.
    pub fn get_all(&self) -> CoreResult<Vec<Record>> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadOnly, |ctx| ctx.get_all(name))
    }

    /// Number of records.
    pub fn count(&self) -> CoreResult<usize> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadOnly, |ctx| ctx.count(name))
    }

    /// Runs a query.
    pub fn select(&self, query: &Query) -> CoreResult<Vec<Record>> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadOnly, |ctx| ctx.select(name, query))
    }

    /// Writes `record` in full, replacing any record with the same key.
    pub fn update(&self, record: Record) -> CoreResult<Record> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadWrite, |ctx| ctx.put(name, record))
    }

    /// Reads the record with `key`, applies `mutate`, and writes the result,
    /// all in one transaction.
    ///
    /// No other writer can change the record between the read and the
    /// write. If `mutate` fails nothing is written.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if there is no such record, and with
    /// `Validation` if `mutate` changes the primary key.
    pub fn update_by_key<F>(&self, key: impl Into<Value>, mutate: F) -> CoreResult<Record>
    where
        F: FnOnce(Record) -> CoreResult<Record>,
    {
        let key = key.into();
        let name = self.collection.as_str();
        let primary_key = self.primary_key()?;
        self.engine
            .transaction(&[name], TxMode::ReadWrite, |ctx| {
                let current = ctx
                    .get(name, &key)?
                    .ok_or_else(|| CoreError::not_found(name, key.clone()))?;
                let mut next = mutate(current)?;
                match next.get(primary_key) {
                    None | Some(Value::Null) => {
                        next.set(primary_key, key.clone());
                    }
                    Some(changed) if *changed != key => {
                        return Err(CoreError::validation(
                            name,
                            format!("primary key '{primary_key}' changed from {key} to {changed}"),
                        ));
                    }
                    Some(_) => {}
                }
                ctx.put(name, next)
            })
    }

    /// Deletes the record with `key`. Missing keys are ignored.
    pub fn delete(&self, key: impl Into<Value>) -> CoreResult<()> {
        let key = key.into();
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadWrite, |ctx| ctx.delete(name, &key))
    }

    /// Deletes every record.
    pub fn clear(&self) -> CoreResult<()> {
        let name = self.collection.as_str();
        self.engine
            .transaction(&[name], TxMode::ReadWrite, |ctx| ctx.clear(name))
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("database", &self.engine.name())
            .field("collection", &self.collection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, FieldDef, Schema};
    use shelfdb_storage::LocalEngine;

    fn users() -> Repository {
        let schema = Schema::define([(
            "user",
            CollectionDef::new()
                .field("id", FieldDef::integer().primary())
                .field("name", FieldDef::string())
                .field("age", FieldDef::integer()),
        )])
        .unwrap();
        Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema)
            .unwrap()
            .repository("user")
            .unwrap()
    }

    #[test]
    fn get_missing_is_not_found() {
        let users = users();
        assert!(users.find(1).unwrap().is_none());
        assert!(users.get(1).unwrap_err().is_not_found());
    }

    #[test]
    fn update_replaces_whole_record() {
        let users = users();
        users
            .insert(Record::new().with("name", "Marcus").with("age", 30))
            .unwrap();
        users.update(Record::new().with("id", 1).with("name", "Marcus Aurelius")).unwrap();

        let marcus = users.get(1).unwrap();
        assert_eq!(marcus.get_str("name"), Some("Marcus Aurelius"));
        assert!(!marcus.contains("age"));
    }

    #[test]
    fn update_by_key_keeps_key() {
        let users = users();
        users
            .insert(Record::new().with("name", "Marcus").with("age", 30))
            .unwrap();

        let updated = users
            .update_by_key(1, |mut r| {
                r.remove("id");
                r.set("age", 31);
                Ok(r)
            })
            .unwrap();
        assert_eq!(updated.get_i64("id"), Some(1));
        assert_eq!(users.count().unwrap(), 1);

        let err = users
            .update_by_key(1, |r| Ok(r.with("id", 2)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(users.find(2).unwrap().is_none());
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let users = users();
        users
            .insert(Record::new().with("name", "Marcus").with("age", 30))
            .unwrap();

        let err = users
            .update_by_key(1, |_| Err(CoreError::aborted("no")))
            .unwrap_err();
        assert!(matches!(err, CoreError::Aborted { .. }));
        assert_eq!(users.get(1).unwrap().get_i64("age"), Some(30));
    }

    #[test]
    fn delete_and_clear() {
        let users = users();
        for name in ["Marcus", "Lucius", "Julia"] {
            users.insert(Record::new().with("name", name)).unwrap();
        }
        users.delete(2).unwrap();
        users.delete(99).unwrap();
        assert_eq!(users.count().unwrap(), 2);

        users.clear().unwrap();
        assert!(users.get_all().unwrap().is_empty());
        let next = users.insert(Record::new().with("name", "Livia")).unwrap();
        assert_eq!(next.get_i64("id"), Some(4));
    }
}
