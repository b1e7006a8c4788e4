//! Engine: one connection to one named backing database.

use crate::config::Config;
use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::repository::Repository;
use crate::schema::Schema;
use parking_lot::{Mutex, RwLock};
use shelfdb_storage::{BackingDatabase, BackingEngine, TxMode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Connection state of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not opened yet, or closed.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// Open and upgraded; transactions may begin.
    Connected,
    /// The last open attempt failed.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

struct Connection {
    state: ConnectionState,
    database: Option<Arc<dyn BackingDatabase>>,
    failure: Option<CoreError>,
}

/// The handle through which all transactions on one database are made.
///
/// An engine is created `Disconnected` with a fixed name, version and
/// schema. [`open`](Self::open) asks the backing engine for the database,
/// running [`Schema::upgrade`] first when the stored version is older.
///
/// ```rust
/// use shelfdb_core::{CollectionDef, Engine, FieldDef, Record, Schema};
/// use shelfdb_storage::LocalEngine;
/// use std::sync::Arc;
///
/// let schema = Schema::define([(
///     "user",
///     CollectionDef::new()
///         .field("id", FieldDef::integer().primary())
///         .field("name", FieldDef::string()),
/// )])
/// .unwrap();
/// let engine = Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema).unwrap();
///
/// let users = engine.repository("user").unwrap();
/// let marcus = users.insert(Record::new().with("name", "Marcus")).unwrap();
/// assert_eq!(marcus.get_i64("id"), Some(1));
/// ```
pub struct Engine {
    backing: Arc<dyn BackingEngine>,
    name: String,
    version: u32,
    schema: Schema,
    config: Config,
    connection: RwLock<Connection>,
    /// Serializes open attempts.
    open_lock: Mutex<()>,
    /// Number of finished open attempts.
    attempts: AtomicU64,
}

impl Engine {
    /// Creates a disconnected engine with default configuration.
    pub fn new(
        backing: Arc<dyn BackingEngine>,
        name: impl Into<String>,
        version: u32,
        schema: Schema,
    ) -> Self {
        Self::with_config(backing, name, version, schema, Config::default())
    }

    /// Creates a disconnected engine.
    pub fn with_config(
        backing: Arc<dyn BackingEngine>,
        name: impl Into<String>,
        version: u32,
        schema: Schema,
        config: Config,
    ) -> Self {
        Self {
            backing,
            name: name.into(),
            version,
            schema,
            config,
            connection: RwLock::new(Connection {
                state: ConnectionState::Disconnected,
                database: None,
                failure: None,
            }),
            open_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Creates an engine and opens it.
    pub fn connect(
        backing: Arc<dyn BackingEngine>,
        name: impl Into<String>,
        version: u32,
        schema: Schema,
    ) -> CoreResult<Arc<Self>> {
        let engine = Arc::new(Self::new(backing, name, version, schema));
        engine.open()?;
        Ok(engine)
    }

    /// Opens the database, upgrading it if needed.
    ///
    /// A no-op when already connected. A failed engine retries. Callers
    /// that arrive while another open is in flight wait for it and get
    /// its outcome instead of opening again.
    ///
    /// # Errors
    ///
    /// Fails with `Connection` carrying the backing engine's or the
    /// upgrade's error.
    pub fn open(&self) -> CoreResult<()> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.open_lock.lock();
        if self.attempts.load(Ordering::SeqCst) != seen {
            return self.outcome();
        }
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.connection.write().state = ConnectionState::Connecting;
        tracing::debug!(database = %self.name, version = self.version, "opening database");

        let result = self
            .backing
            .open(&self.name, self.version, &mut |change| {
                self.schema.upgrade(change)
            });

        let outcome = {
            let mut connection = self.connection.write();
            match result {
                Ok(database) => {
                    connection.state = ConnectionState::Connected;
                    connection.database = Some(database);
                    connection.failure = None;
                    tracing::debug!(database = %self.name, "connected");
                    Ok(())
                }
                Err(e) => {
                    let err = CoreError::connection(&self.name, e.into());
                    connection.state = ConnectionState::Failed;
                    connection.database = None;
                    connection.failure = Some(err.clone());
                    tracing::debug!(database = %self.name, error = %err, "open failed");
                    Err(err)
                }
            }
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn outcome(&self) -> CoreResult<()> {
        let connection = self.connection.read();
        match connection.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed => Err(connection
                .failure
                .clone()
                .unwrap_or_else(|| CoreError::not_connected(&self.name))),
            _ => Err(CoreError::not_connected(&self.name)),
        }
    }

    /// Drops the connection. Open contexts keep working until they finish.
    pub fn close(&self) {
        let _guard = self.open_lock.lock();
        let mut connection = self.connection.write();
        if connection.state != ConnectionState::Disconnected {
            tracing::debug!(database = %self.name, "closing database");
        }
        connection.state = ConnectionState::Disconnected;
        connection.database = None;
        connection.failure = None;
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.read().state
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema version this engine opens at.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn database(&self) -> CoreResult<Arc<dyn BackingDatabase>> {
        let connection = self.connection.read();
        match (&connection.state, &connection.database) {
            (ConnectionState::Connected, Some(database)) => Ok(Arc::clone(database)),
            (ConnectionState::Failed, _) => Err(connection
                .failure
                .clone()
                .unwrap_or_else(|| CoreError::not_connected(&self.name))),
            _ => Err(CoreError::not_connected(&self.name)),
        }
    }

    /// Starts a transaction over `collections`.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` (or the stored `Connection` error after a
    /// failed open), or `Query` for a collection the schema lacks.
    pub fn begin(&self, collections: &[&str], mode: TxMode) -> CoreResult<Context<'_>> {
        let database = self.database()?;
        for name in collections {
            self.schema.require(name)?;
        }
        let tx = database.transaction(collections, mode)?;
        Ok(Context::new(self, collections, tx))
    }

    /// Runs `unit` inside a transaction.
    ///
    /// Commits if `unit` returns `Ok` and no operation failed, returning the
    /// unit's value. Otherwise aborts and returns the first error.
    pub fn transaction<T, F>(&self, collections: &[&str], mode: TxMode, unit: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Context<'_>) -> CoreResult<T>,
    {
        let mut context = self.begin(collections, mode)?;
        match unit(&mut context) {
            Ok(value) => {
                context.commit()?;
                Ok(value)
            }
            Err(err) => {
                let first = context.first_error().cloned().unwrap_or(err);
                context.abort();
                Err(first)
            }
        }
    }

    /// Returns a repository for one collection.
    pub fn repository(self: &Arc<Self>, collection: &str) -> CoreResult<Repository> {
        Repository::new(Arc::clone(self), collection)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, FieldDef};
    use shelfdb_storage::{LocalEngine, StorageError, StorageResult, UpgradeHook};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn schema() -> Schema {
        Schema::define([(
            "user",
            CollectionDef::new()
                .field("id", FieldDef::integer().primary())
                .field("name", FieldDef::string()),
        )])
        .unwrap()
    }

    /// Counts opens and can be told to fail.
    struct Flaky {
        inner: LocalEngine,
        opens: AtomicUsize,
        fail: Mutex<bool>,
    }

    impl BackingEngine for Flaky {
        fn open(
            &self,
            name: &str,
            version: u32,
            upgrade: &mut UpgradeHook<'_>,
        ) -> StorageResult<Arc<dyn BackingDatabase>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            if *self.fail.lock() {
                return Err(StorageError::upgrade_failed("refused"));
            }
            self.inner.open(name, version, upgrade)
        }

        fn delete_database(&self, name: &str) -> StorageResult<bool> {
            self.inner.delete_database(name)
        }

        fn database_names(&self) -> Vec<String> {
            self.inner.database_names()
        }
    }

    fn flaky(fail: bool) -> Arc<Flaky> {
        Arc::new(Flaky {
            inner: LocalEngine::in_memory(),
            opens: AtomicUsize::new(0),
            fail: Mutex::new(fail),
        })
    }

    #[test]
    fn lifecycle() {
        let engine = Engine::new(Arc::new(LocalEngine::in_memory()), "app", 1, schema());
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(matches!(
            engine.begin(&["user"], TxMode::ReadOnly),
            Err(CoreError::NotConnected { .. })
        ));

        engine.open().unwrap();
        assert_eq!(engine.state(), ConnectionState::Connected);
        engine.open().unwrap();
        engine.begin(&["user"], TxMode::ReadOnly).unwrap();

        engine.close();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(matches!(
            engine.begin(&["user"], TxMode::ReadOnly),
            Err(CoreError::NotConnected { .. })
        ));
    }

    #[test]
    fn failed_open_is_sticky_until_retried() {
        let backing = flaky(true);
        let engine = Engine::new(backing.clone(), "app", 1, schema());

        let err = engine.open().unwrap_err();
        assert!(matches!(err, CoreError::Connection { .. }));
        assert_eq!(engine.state(), ConnectionState::Failed);
        assert!(matches!(
            engine.begin(&["user"], TxMode::ReadOnly),
            Err(CoreError::Connection { .. })
        ));

        *backing.fail.lock() = false;
        engine.open().unwrap();
        assert_eq!(engine.state(), ConnectionState::Connected);
    }

    #[test]
    fn upgrade_failure_fails_connection() {
        let backing = Arc::new(LocalEngine::in_memory());
        backing
            .open("app", 2, &mut |_| Ok(()))
            .unwrap();
        // stored version 2 is newer than requested
        let engine = Engine::new(backing, "app", 1, schema());
        let err = engine.open().unwrap_err();
        match err {
            CoreError::Connection { name, cause } => {
                assert_eq!(name, "app");
                assert!(matches!(*cause, CoreError::Storage(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn concurrent_opens_share_one_attempt() {
        let backing = flaky(false);
        let engine = Arc::new(Engine::new(backing.clone(), "app", 1, schema()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.open())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(backing.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_collection_is_query_error() {
        let engine = Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema()).unwrap();
        assert!(matches!(
            engine.begin(&["nope"], TxMode::ReadOnly),
            Err(CoreError::Query { .. })
        ));
        assert!(matches!(
            engine.repository("nope"),
            Err(CoreError::Query { .. })
        ));
    }

    #[test]
    fn transaction_returns_unit_value_or_first_error() {
        let engine = Engine::connect(Arc::new(LocalEngine::in_memory()), "app", 1, schema()).unwrap();

        let key = engine
            .transaction(&["user"], TxMode::ReadWrite, |ctx| {
                let record = ctx.add("user", crate::Record::new().with("name", "Marcus"))?;
                Ok(record.get_i64("id"))
            })
            .unwrap();
        assert_eq!(key, Some(1));

        let result: CoreResult<()> = engine.transaction(&["user"], TxMode::ReadWrite, |ctx| {
            ctx.add("user", crate::Record::new().with("name", "Lucius"))?;
            Err(CoreError::aborted("changed my mind"))
        });
        assert!(matches!(result, Err(CoreError::Aborted { .. })));

        let count = engine
            .transaction(&["user"], TxMode::ReadOnly, |ctx| ctx.count("user"))
            .unwrap();
        assert_eq!(count, 1);
    }
}
