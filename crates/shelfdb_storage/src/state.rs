//! In-memory database state.
//!
//! `DatabaseState` is an immutable value once committed. Stores are shared
//! behind `Arc` so a new committed state only copies the stores a batch
//! actually wrote to.

use crate::backend::{IndexSpec, StoreOptions};
use crate::error::{StorageError, StorageResult};
use shelfdb_codec::{from_cbor, to_cbor, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Committed contents of one database.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    /// Schema version, 0 until the first upgrade.
    pub version: u32,
    /// Object stores by name.
    pub stores: BTreeMap<String, Arc<StoreState>>,
}

/// A secondary index: field value -> keys of records holding it.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    pub spec: IndexSpec,
    pub entries: BTreeMap<Value, BTreeSet<Value>>,
}

impl IndexState {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, record: &Value, key: &Value) {
        if let Some(field_value) = indexed_value(record, &self.spec.field) {
            self.entries
                .entry(field_value.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    fn remove(&mut self, record: &Value, key: &Value) {
        if let Some(field_value) = indexed_value(record, &self.spec.field) {
            if let Some(keys) = self.entries.get_mut(field_value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.entries.remove(field_value);
                }
            }
        }
    }
}

fn indexed_value<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    record
        .as_map()
        .and_then(|m| m.get(field))
        .filter(|v| !v.is_null())
}

/// One object store: records by key, encoded as CBOR.
#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    pub options: StoreOptions,
    pub records: BTreeMap<Value, Vec<u8>>,
    /// Next generated key.
    pub next_key: i64,
    pub indexes: BTreeMap<String, IndexState>,
}

impl StoreState {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            records: BTreeMap::new(),
            next_key: 1,
            indexes: BTreeMap::new(),
        }
    }

    /// Finds or generates the key for `record`, writing a generated key
    /// into the record. The counter only moves once the write succeeds.
    pub fn resolve_key(&self, store: &str, record: &mut Value) -> StorageResult<(Value, bool)> {
        let key_path = &self.options.key_path;
        let map = record
            .as_map_mut()
            .ok_or_else(|| StorageError::invalid_record(store, "record must be a map"))?;

        match map.get(key_path).cloned() {
            Some(Value::Null) | None => {
                if !self.options.auto_increment {
                    return Err(StorageError::MissingKey {
                        store: store.to_string(),
                        key_path: key_path.clone(),
                    });
                }
                let key = Value::Integer(self.next_key);
                map.insert(key_path.clone(), key.clone());
                Ok((key, true))
            }
            Some(key @ (Value::Integer(_) | Value::Text(_) | Value::Bytes(_))) => Ok((key, false)),
            Some(other) => Err(StorageError::InvalidKey {
                store: store.to_string(),
                type_name: other.type_name(),
            }),
        }
    }

    /// Stores an encoded record under `key`, keeping indexes and the key
    /// generator in step.
    pub fn write(&mut self, key: Value, record: &Value) -> StorageResult<()> {
        let bytes = to_cbor(record)?;
        if let Some(old) = self.records.get(&key) {
            if !self.indexes.is_empty() {
                let old = from_cbor(old)?;
                for index in self.indexes.values_mut() {
                    index.remove(&old, &key);
                }
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(record, &key);
        }
        if let Value::Integer(n) = key {
            if self.options.auto_increment && n >= self.next_key {
                self.next_key = n.saturating_add(1);
            }
        }
        self.records.insert(key, bytes);
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> StorageResult<()> {
        if let Some(old) = self.records.remove(key) {
            if !self.indexes.is_empty() {
                let old = from_cbor(&old)?;
                for index in self.indexes.values_mut() {
                    index.remove(&old, key);
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    pub fn read(&self, key: &Value) -> StorageResult<Option<Value>> {
        self.records
            .get(key)
            .map(|bytes| from_cbor(bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Adds an index, filling it from the current records.
    pub fn add_index(&mut self, spec: IndexSpec) -> StorageResult<()> {
        let mut index = IndexState::new(spec);
        for (key, bytes) in &self.records {
            index.insert(&from_cbor(bytes)?, key);
        }
        self.indexes.insert(index.spec.name.clone(), index);
        Ok(())
    }

    pub fn index_keys(&self, index: &str, value: &Value) -> Option<Vec<Value>> {
        self.indexes.get(index).map(|idx| {
            idx.entries
                .get(value)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default()
        })
    }
}
