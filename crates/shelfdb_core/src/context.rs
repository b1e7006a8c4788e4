//! Transaction context.
//!
//! A [`Context`] wraps one backing transaction over a fixed set of
//! collections. Every operation goes through it so it can enforce scope,
//! validate writes against the schema, and remember the first failure.

use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::query::{self, Query};
use crate::record::Record;
use crate::schema::CollectionSchema;
use shelfdb_codec::Value;
use shelfdb_storage::{BackingTransaction, Cursor, TxMode};
use std::fmt;

/// Lifecycle state of a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    /// Accepting operations.
    Open,
    /// Commit in progress.
    Committing,
    /// All operations applied.
    Committed,
    /// An operation failed; the context can only abort.
    Aborting,
    /// No operation took effect.
    Aborted,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Open => write!(f, "open"),
            TxState::Committing => write!(f, "committing"),
            TxState::Committed => write!(f, "committed"),
            TxState::Aborting => write!(f, "aborting"),
            TxState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug)]
struct Status {
    state: TxState,
    first_error: Option<CoreError>,
}

impl Status {
    fn fail(&mut self, err: &CoreError) {
        if self.first_error.is_none() {
            self.first_error = Some(err.clone());
        }
        if self.state == TxState::Open {
            self.state = TxState::Aborting;
        }
    }
}

/// An open transaction over one or more collections.
///
/// Obtained from [`Engine::begin`] or inside [`Engine::transaction`].
/// Operations run in the order issued. Once any of them fails, the
/// context moves to `Aborting` and rejects further work; commit then
/// aborts and returns the first error. Dropping an unfinished context
/// aborts it.
pub struct Context<'e> {
    engine: &'e Engine,
    collections: Vec<String>,
    mode: TxMode,
    tx: Option<Box<dyn BackingTransaction>>,
    status: Status,
}

impl<'e> Context<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        collections: &[&str],
        tx: Box<dyn BackingTransaction>,
    ) -> Self {
        Self {
            engine,
            collections: collections.iter().map(|c| (*c).to_string()).collect(),
            mode: tx.mode(),
            tx: Some(tx),
            status: Status {
                state: TxState::Open,
                first_error: None,
            },
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.status.state
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Collections in scope.
    #[must_use]
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// The first error any operation raised.
    #[must_use]
    pub fn first_error(&self) -> Option<&CoreError> {
        self.status.first_error.as_ref()
    }

    /// Runs one operation, recording its failure.
    fn run<T>(
        &mut self,
        collection: &str,
        op: impl FnOnce(&mut dyn BackingTransaction, &'e CollectionSchema) -> CoreResult<T>,
    ) -> CoreResult<T> {
        if self.status.state != TxState::Open {
            return Err(CoreError::transaction(format!(
                "transaction is {}",
                self.status.state
            )));
        }
        let result = self.check(collection).and_then(|schema| match self.tx.as_deref_mut() {
            Some(tx) => op(tx, schema),
            None => Err(CoreError::transaction("transaction already finished")),
        });
        if let Err(err) = &result {
            tracing::trace!(collection, error = %err, "operation failed");
            self.status.fail(err);
        }
        result
    }

    fn check(&self, collection: &str) -> CoreResult<&'e CollectionSchema> {
        let engine = self.engine;
        let schema = engine.schema().require(collection)?;
        if !self.collections.iter().any(|c| c == collection) {
            return Err(CoreError::query(format!(
                "collection '{collection}' is not part of this transaction"
            )));
        }
        Ok(schema)
    }

    fn write(
        &mut self,
        collection: &str,
        record: Record,
        overwrite: bool,
    ) -> CoreResult<Record> {
        let engine = self.engine;
        let config = engine.config();
        let mode = self.mode;
        self.run(collection, |tx, schema| {
            if mode == TxMode::ReadOnly {
                return Err(CoreError::transaction(format!(
                    "cannot write to '{collection}' in a read-only transaction"
                )));
            }
            schema.validate(&record, config)?;
            let mut record = record;
            let value = record.clone().into_value();
            let key = if overwrite {
                tx.put(collection, value)?
            } else {
                tx.add(collection, value)?
            };
            record.set(schema.primary_key(), key);
            Ok(record)
        })
    }

    /// Inserts a record; fails with `Conflict` if its key exists.
    ///
    /// Returns the stored record, including a generated key.
    pub fn add(&mut self, collection: &str, record: Record) -> CoreResult<Record> {
        self.write(collection, record, false)
    }

    /// Inserts or replaces a record.
    pub fn put(&mut self, collection: &str, record: Record) -> CoreResult<Record> {
        self.write(collection, record, true)
    }

    /// Reads a record by primary key.
    pub fn get(&mut self, collection: &str, key: &Value) -> CoreResult<Option<Record>> {
        self.run(collection, |tx, _| {
            tx.get(collection, key)?.map(Record::try_from).transpose()
        })
    }

    /// Reads every record in primary key order.
    pub fn get_all(&mut self, collection: &str) -> CoreResult<Vec<Record>> {
        self.run(collection, |tx, _| {
            tx.get_all(collection)?
                .into_iter()
                .map(Record::try_from)
                .collect()
        })
    }

    /// Number of records.
    pub fn count(&mut self, collection: &str) -> CoreResult<usize> {
        self.run(collection, |tx, _| Ok(tx.count(collection)?))
    }

    /// Deletes a record. Deleting a missing key is not an error.
    pub fn delete(&mut self, collection: &str, key: &Value) -> CoreResult<()> {
        let mode = self.mode;
        self.run(collection, |tx, _| {
            if mode == TxMode::ReadOnly {
                return Err(CoreError::transaction(format!(
                    "cannot write to '{collection}' in a read-only transaction"
                )));
            }
            Ok(tx.delete(collection, key)?)
        })
    }

    /// Deletes every record; the key counter keeps counting.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        let mode = self.mode;
        self.run(collection, |tx, _| {
            if mode == TxMode::ReadOnly {
                return Err(CoreError::transaction(format!(
                    "cannot write to '{collection}' in a read-only transaction"
                )));
            }
            Ok(tx.clear(collection)?)
        })
    }

    /// Opens a forward scan in ascending primary key order.
    ///
    /// The scan is lazy and cannot be restarted. It sees the records as
    /// they were when it was opened.
    pub fn open_scan(&mut self, collection: &str) -> CoreResult<Scan<'_>> {
        let cursor = self.run(collection, |tx, _| Ok(tx.open_cursor(collection)?))?;
        Ok(Scan {
            cursor,
            status: &mut self.status,
        })
    }

    /// Keys of records whose `field` equals `value`, in key order.
    ///
    /// Returns `None` when the field has no index.
    pub fn index_lookup(
        &mut self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> CoreResult<Option<Vec<Value>>> {
        self.run(collection, |tx, schema| {
            if !schema.is_indexed(field) {
                return Ok(None);
            }
            Ok(tx.index_keys(collection, field, value)?)
        })
    }

    /// Runs a query against one collection.
    pub fn select(&mut self, collection: &str, query: &Query) -> CoreResult<Vec<Record>> {
        query::scan(self, collection, query)
    }

    pub(crate) fn schema_of(&mut self, collection: &str) -> CoreResult<&'e CollectionSchema> {
        let result = self.check(collection);
        if let Err(err) = &result {
            self.status.fail(err);
        }
        result
    }

    pub(crate) fn fail(&mut self, err: &CoreError) {
        self.status.fail(err);
    }

    pub(crate) fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Commits every operation as one unit.
    ///
    /// # Errors
    ///
    /// If an operation failed earlier, aborts and returns that first
    /// error. A backing commit failure is a `Transaction` error.
    pub fn commit(mut self) -> CoreResult<()> {
        match self.status.state {
            TxState::Open => {}
            TxState::Aborting => {
                let err = self
                    .status
                    .first_error
                    .clone()
                    .unwrap_or_else(|| CoreError::transaction("transaction is aborting"));
                self.finish_abort();
                return Err(err);
            }
            state => {
                return Err(CoreError::transaction(format!("transaction is {state}")));
            }
        }

        self.status.state = TxState::Committing;
        let Some(tx) = self.tx.take() else {
            self.status.state = TxState::Aborted;
            return Err(CoreError::transaction("transaction already finished"));
        };
        let id = tx.id();
        match tx.commit() {
            Ok(()) => {
                self.status.state = TxState::Committed;
                tracing::debug!(database = %self.engine.name(), txid = id, "committed");
                Ok(())
            }
            Err(e) => {
                self.status.state = TxState::Aborted;
                tracing::debug!(database = %self.engine.name(), txid = id, error = %e, "commit failed");
                Err(CoreError::transaction(format!("commit failed: {e}")))
            }
        }
    }

    /// Discards every operation.
    pub fn abort(mut self) {
        self.finish_abort();
    }

    fn finish_abort(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::debug!(database = %self.engine.name(), txid = tx.id(), "aborted");
            tx.abort();
        }
        self.status.state = TxState::Aborted;
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.finish_abort();
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("collections", &self.collections)
            .field("mode", &self.mode)
            .field("state", &self.status.state)
            .finish()
    }
}

/// A lazy forward scan over one collection.
///
/// Yields records in ascending primary key order. A failed step puts the
/// owning context into `Aborting`.
pub struct Scan<'c> {
    cursor: Cursor,
    status: &'c mut Status,
}

impl Iterator for Scan<'_> {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self
            .cursor
            .next()?
            .map_err(CoreError::from)
            .and_then(|(_, record)| Record::try_from(record));
        if let Err(err) = &step {
            self.status.fail(err);
        }
        Some(step)
    }
}
