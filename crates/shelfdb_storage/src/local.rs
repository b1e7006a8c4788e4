//! Local backing engine.
//!
//! Databases live in memory as immutable committed states. A read-only
//! batch clones the `Arc`s of its stores and reads that snapshot for its
//! whole life. A read-write batch holds the database's write lock, copies
//! a store the first time it writes to it, and on commit swaps the copies
//! into a new committed state.

use crate::backend::{
    BackingDatabase, BackingEngine, BackingTransaction, Cursor, CursorEntry, IndexSpec,
    StoreOptions, TxMode, UpgradeHook, VersionChange,
};
use crate::error::{StorageError, StorageResult};
use crate::image::DataDir;
use crate::state::{DatabaseState, StoreState};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use shelfdb_codec::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Shared state of one named database.
struct DatabaseShared {
    name: String,
    committed: RwLock<Arc<DatabaseState>>,
    /// Held by the single active writer or version change.
    write_lock: Arc<Mutex<()>>,
    /// Thread holding `write_lock`, set only while it is held.
    writer: Mutex<Option<ThreadId>>,
    dir: Option<Arc<DataDir>>,
    next_txid: AtomicU64,
}

/// The write lock of one database, tagged with the thread that holds it.
struct WriteGuard {
    shared: Arc<DatabaseShared>,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        // Cleared before the lock itself is released.
        *self.shared.writer.lock() = None;
    }
}

impl DatabaseShared {
    fn snapshot(&self) -> Arc<DatabaseState> {
        Arc::clone(&self.committed.read())
    }

    /// Takes the write lock, waiting for writers on other threads.
    ///
    /// Fails with `WriterActive` instead of deadlocking when the calling
    /// thread already holds it.
    fn acquire_writer(self: &Arc<Self>) -> StorageResult<WriteGuard> {
        let me = thread::current().id();
        let guard = match self.write_lock.try_lock_arc() {
            Some(guard) => guard,
            None => {
                if *self.writer.lock() == Some(me) {
                    return Err(StorageError::WriterActive {
                        database: self.name.clone(),
                    });
                }
                self.write_lock.lock_arc()
            }
        };
        *self.writer.lock() = Some(me);
        Ok(WriteGuard {
            shared: Arc::clone(self),
            _guard: guard,
        })
    }

    /// Publishes a new committed state, imaging it first when persistent.
    fn publish(&self, next: DatabaseState) -> StorageResult<()> {
        if let Some(dir) = &self.dir {
            dir.save(&self.name, &next)?;
        }
        *self.committed.write() = Arc::new(next);
        Ok(())
    }
}

/// The in-process backing engine.
///
/// # Example
///
/// ```rust
/// use shelfdb_storage::{BackingEngine, LocalEngine, StoreOptions};
///
/// let engine = LocalEngine::in_memory();
/// let db = engine
///     .open("app", 1, &mut |change| {
///         change.create_store("user", StoreOptions::auto_increment("id"))
///     })
///     .unwrap();
/// assert_eq!(db.store_names(), vec!["user".to_string()]);
/// ```
pub struct LocalEngine {
    databases: Mutex<HashMap<String, Arc<DatabaseShared>>>,
    dir: Option<Arc<DataDir>>,
}

impl LocalEngine {
    /// Creates an engine whose databases vanish with it.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            dir: None,
        }
    }

    /// Creates an engine that images every database into `path`.
    ///
    /// # Errors
    ///
    /// Fails with `Locked` if another engine holds the directory.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let dir = DataDir::open(path)?;
        tracing::debug!(path = %path.display(), "opened data directory");
        Ok(Self {
            databases: Mutex::new(HashMap::new()),
            dir: Some(Arc::new(dir)),
        })
    }

    /// Returns the data directory, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref().map(DataDir::path)
    }

    fn shared(&self, name: &str) -> StorageResult<Arc<DatabaseShared>> {
        let mut databases = self.databases.lock();
        if let Some(shared) = databases.get(name) {
            return Ok(Arc::clone(shared));
        }

        let state = match &self.dir {
            Some(dir) => dir.load(name)?.unwrap_or_default(),
            None => DatabaseState::default(),
        };
        let shared = Arc::new(DatabaseShared {
            name: name.to_string(),
            committed: RwLock::new(Arc::new(state)),
            write_lock: Arc::new(Mutex::new(())),
            writer: Mutex::new(None),
            dir: self.dir.clone(),
            next_txid: AtomicU64::new(1),
        });
        databases.insert(name.to_string(), Arc::clone(&shared));
        Ok(shared)
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("path", &self.path())
            .field("databases", &self.databases.lock().len())
            .finish()
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName {
            name: name.to_string(),
        })
    }
}

impl BackingEngine for LocalEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &mut UpgradeHook<'_>,
    ) -> StorageResult<Arc<dyn BackingDatabase>> {
        validate_name(name)?;
        if version == 0 {
            return Err(StorageError::InvalidVersion { version });
        }

        let shared = self.shared(name)?;
        let _writer = shared.acquire_writer()?;

        let current = shared.snapshot();
        if version < current.version {
            return Err(StorageError::VersionDowngrade {
                requested: version,
                stored: current.version,
            });
        }

        if version > current.version {
            tracing::debug!(
                database = name,
                old_version = current.version,
                new_version = version,
                "upgrading database"
            );
            let mut next = (*current).clone();
            {
                let mut change = LocalVersionChange {
                    old_version: current.version,
                    new_version: version,
                    state: &mut next,
                };
                upgrade(&mut change)?;
            }
            next.version = version;
            shared.publish(next)?;
        }

        Ok(Arc::new(LocalDatabase {
            shared: Arc::clone(&shared),
        }))
    }

    fn delete_database(&self, name: &str) -> StorageResult<bool> {
        validate_name(name)?;
        let removed = self.databases.lock().remove(name).is_some();
        let imaged = match &self.dir {
            Some(dir) => dir.remove(name)?,
            None => false,
        };
        Ok(removed || imaged)
    }

    fn database_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.databases.lock().keys().cloned().collect();
        if let Some(dir) = &self.dir {
            names.extend(dir.image_names().unwrap_or_default());
        }
        names.into_iter().collect()
    }
}

struct LocalVersionChange<'a> {
    old_version: u32,
    new_version: u32,
    state: &'a mut DatabaseState,
}

impl VersionChange for LocalVersionChange<'_> {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn store_names(&self) -> Vec<String> {
        self.state.stores.keys().cloned().collect()
    }

    fn contains_store(&self, name: &str) -> bool {
        self.state.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str, options: StoreOptions) -> StorageResult<()> {
        if self.contains_store(name) {
            return Err(StorageError::StoreExists {
                name: name.to_string(),
            });
        }
        tracing::debug!(store = name, key_path = %options.key_path, "creating object store");
        self.state
            .stores
            .insert(name.to_string(), Arc::new(StoreState::new(options)));
        Ok(())
    }

    fn contains_index(&self, store: &str, index: &str) -> bool {
        self.state
            .stores
            .get(store)
            .is_some_and(|s| s.indexes.contains_key(index))
    }

    fn create_index(&mut self, store: &str, spec: IndexSpec) -> StorageResult<()> {
        let state = self
            .state
            .stores
            .get_mut(store)
            .ok_or_else(|| StorageError::UnknownStore {
                name: store.to_string(),
            })?;
        if state.indexes.contains_key(&spec.name) {
            return Err(StorageError::IndexExists {
                store: store.to_string(),
                index: spec.name,
            });
        }
        tracing::debug!(store, index = %spec.name, field = %spec.field, "creating index");
        Arc::make_mut(state).add_index(spec)
    }
}

/// A database opened through [`LocalEngine`].
pub struct LocalDatabase {
    shared: Arc<DatabaseShared>,
}

impl BackingDatabase for LocalDatabase {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn version(&self) -> u32 {
        self.shared.snapshot().version
    }

    fn store_names(&self) -> Vec<String> {
        self.shared.snapshot().stores.keys().cloned().collect()
    }

    fn transaction(
        &self,
        stores: &[&str],
        mode: TxMode,
    ) -> StorageResult<Box<dyn BackingTransaction>> {
        // Writers take the lock before the snapshot so they see every
        // commit that precedes them.
        let write_guard = match mode {
            TxMode::ReadWrite => Some(self.shared.acquire_writer()?),
            TxMode::ReadOnly => None,
        };

        let snapshot = self.shared.snapshot();
        let mut scoped = BTreeMap::new();
        for &name in stores {
            let store = snapshot
                .stores
                .get(name)
                .ok_or_else(|| StorageError::UnknownStore {
                    name: name.to_string(),
                })?;
            scoped.insert(name.to_string(), Arc::clone(store));
        }

        let id = self.shared.next_txid.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(database = %self.shared.name, txid = id, %mode, ?stores, "begin");

        Ok(Box::new(LocalTransaction {
            id,
            shared: Arc::clone(&self.shared),
            mode,
            stores: scoped,
            dirty: BTreeSet::new(),
            _write_guard: write_guard,
        }))
    }
}

impl std::fmt::Debug for LocalDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDatabase")
            .field("name", &self.shared.name)
            .field("version", &self.version())
            .finish()
    }
}

struct LocalTransaction {
    id: u64,
    shared: Arc<DatabaseShared>,
    mode: TxMode,
    /// Scoped stores: the snapshot, replaced by private copies once written.
    stores: BTreeMap<String, Arc<StoreState>>,
    dirty: BTreeSet<String>,
    /// Released on commit, abort or drop.
    _write_guard: Option<WriteGuard>,
}

impl LocalTransaction {
    fn store(&self, name: &str) -> StorageResult<&Arc<StoreState>> {
        self.stores.get(name).ok_or_else(|| self.missing(name))
    }

    fn store_mut(&mut self, name: &str) -> StorageResult<&mut StoreState> {
        if self.mode == TxMode::ReadOnly {
            return Err(StorageError::ReadOnly {
                store: name.to_string(),
            });
        }
        if !self.stores.contains_key(name) {
            return Err(self.missing(name));
        }
        self.dirty.insert(name.to_string());
        let store = self
            .stores
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownStore {
                name: name.to_string(),
            })?;
        Ok(Arc::make_mut(store))
    }

    fn missing(&self, name: &str) -> StorageError {
        if self.shared.snapshot().stores.contains_key(name) {
            StorageError::NotInScope {
                name: name.to_string(),
            }
        } else {
            StorageError::UnknownStore {
                name: name.to_string(),
            }
        }
    }

    fn write(&mut self, store: &str, mut record: Value, overwrite: bool) -> StorageResult<Value> {
        let state = self.store_mut(store)?;
        let (key, _generated) = state.resolve_key(store, &mut record)?;
        if !overwrite && state.records.contains_key(&key) {
            return Err(StorageError::KeyExists {
                store: store.to_string(),
                key,
            });
        }
        state.write(key.clone(), &record)?;
        Ok(key)
    }
}

impl BackingTransaction for LocalTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    fn mode(&self) -> TxMode {
        self.mode
    }

    fn add(&mut self, store: &str, record: Value) -> StorageResult<Value> {
        self.write(store, record, false)
    }

    fn put(&mut self, store: &str, record: Value) -> StorageResult<Value> {
        self.write(store, record, true)
    }

    fn get(&self, store: &str, key: &Value) -> StorageResult<Option<Value>> {
        self.store(store)?.read(key)
    }

    fn get_all(&self, store: &str) -> StorageResult<Vec<Value>> {
        self.open_cursor(store)?
            .map(|entry| entry.map(|(_, record)| record))
            .collect()
    }

    fn count(&self, store: &str) -> StorageResult<usize> {
        Ok(self.store(store)?.records.len())
    }

    fn delete(&mut self, store: &str, key: &Value) -> StorageResult<()> {
        self.store_mut(store)?.remove(key)
    }

    fn clear(&mut self, store: &str) -> StorageResult<()> {
        self.store_mut(store)?.clear();
        Ok(())
    }

    fn open_cursor(&self, store: &str) -> StorageResult<Cursor> {
        Ok(Box::new(StoreCursor {
            store: Arc::clone(self.store(store)?),
            position: None,
            exhausted: false,
        }))
    }

    fn index_keys(
        &self,
        store: &str,
        index: &str,
        value: &Value,
    ) -> StorageResult<Option<Vec<Value>>> {
        Ok(self.store(store)?.index_keys(index, value))
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.mode == TxMode::ReadWrite && !self.dirty.is_empty() {
            let mut next = (*self.shared.snapshot()).clone();
            for name in &self.dirty {
                next.stores
                    .insert(name.clone(), Arc::clone(&self.stores[name]));
            }
            self.shared.publish(next)?;
        }
        tracing::trace!(database = %self.shared.name, txid = self.id, writes = self.dirty.len(), "commit");
        Ok(())
    }

    fn abort(self: Box<Self>) {
        tracing::trace!(database = %self.shared.name, txid = self.id, "abort");
    }
}

/// Walks a store snapshot by key, one record per step.
struct StoreCursor {
    store: Arc<StoreState>,
    position: Option<Value>,
    exhausted: bool,
}

impl Iterator for StoreCursor {
    type Item = StorageResult<CursorEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let step = match &self.position {
            None => self.store.records.iter().next(),
            Some(last) => self
                .store
                .records
                .range::<Value, _>((Bound::Excluded(last), Bound::Unbounded))
                .next(),
        }
        .map(|(key, bytes)| (key.clone(), shelfdb_codec::from_cbor(bytes)));

        match step {
            Some((key, Ok(record))) => {
                self.position = Some(key.clone());
                Some(Ok((key, record)))
            }
            Some((_, Err(e))) => {
                self.exhausted = true;
                Some(Err(e.into()))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}
