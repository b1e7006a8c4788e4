//! On-disk database images.
//!
//! A directory-backed engine writes one CBOR image per database after every
//! committed batch:
//!
//! ```text
//! <dir>/
//! ├─ LOCK             # Advisory lock, one process per directory
//! ├─ app.shelf        # Image of database "app"
//! └─ app.shelf.tmp    # Written first, then renamed over the image
//! ```
//!
//! Images hold records as their stored CBOR bytes. Keys and indexes are
//! rebuilt from the records on load.

use crate::backend::{IndexSpec, StoreOptions};
use crate::error::{StorageError, StorageResult};
use crate::state::{DatabaseState, StoreState};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use shelfdb_codec::{from_cbor, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOCK_FILE: &str = "LOCK";
const IMAGE_EXT: &str = "shelf";
const IMAGE_FORMAT: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseImage {
    format: u16,
    name: String,
    version: u32,
    stores: Vec<StoreImage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreImage {
    name: String,
    options: StoreOptions,
    next_key: i64,
    indexes: Vec<IndexSpec>,
    records: Vec<Vec<u8>>,
}

/// A locked data directory.
#[derive(Debug)]
pub(crate) struct DataDir {
    path: PathBuf,
    /// Held for the engine's lifetime.
    _lock_file: File,
}

impl DataDir {
    /// Creates the directory if needed and takes the exclusive lock.
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn image_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.{IMAGE_EXT}"))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.{IMAGE_EXT}.tmp"))
    }

    /// Names of databases with an image in this directory.
    pub fn image_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads a database image, if one exists.
    pub fn load(&self, name: &str) -> StorageResult<Option<DatabaseState>> {
        let path = self.image_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(&path)?);
        let image: DatabaseImage = ciborium::from_reader(reader)
            .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))?;

        if image.format != IMAGE_FORMAT {
            return Err(StorageError::Corrupted(format!(
                "{}: unsupported image format {}",
                path.display(),
                image.format
            )));
        }

        let mut state = DatabaseState {
            version: image.version,
            stores: Default::default(),
        };
        for store in image.stores {
            let name = store.name.clone();
            state.stores.insert(name, Arc::new(restore_store(store)?));
        }

        tracing::debug!(database = name, version = state.version, "loaded image");
        Ok(Some(state))
    }

    /// Writes a database image, replacing the previous one atomically.
    pub fn save(&self, name: &str, state: &DatabaseState) -> StorageResult<()> {
        let image = DatabaseImage {
            format: IMAGE_FORMAT,
            name: name.to_string(),
            version: state.version,
            stores: state
                .stores
                .iter()
                .map(|(store_name, store)| StoreImage {
                    name: store_name.clone(),
                    options: store.options.clone(),
                    next_key: store.next_key,
                    indexes: store.indexes.values().map(|i| i.spec.clone()).collect(),
                    records: store.records.values().cloned().collect(),
                })
                .collect(),
        };

        let temp = self.temp_path(name);
        {
            let file = File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            ciborium::into_writer(&image, &mut writer).map_err(|e| match e {
                ciborium::ser::Error::Io(io) => StorageError::from(io),
                other => StorageError::Corrupted(other.to_string()),
            })?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp, self.image_path(name))?;

        tracing::trace!(database = name, version = state.version, "saved image");
        Ok(())
    }

    /// Deletes a database image. Returns false if there was none.
    pub fn remove(&self, name: &str) -> StorageResult<bool> {
        let path = self.image_path(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

fn restore_store(image: StoreImage) -> StorageResult<StoreState> {
    let mut store = StoreState::new(image.options);
    store.next_key = image.next_key;

    for bytes in image.records {
        let record = from_cbor(&bytes)?;
        let key = record
            .as_map()
            .and_then(|m| m.get(&store.options.key_path))
            .filter(|k| matches!(k, Value::Integer(_) | Value::Text(_) | Value::Bytes(_)))
            .cloned()
            .ok_or_else(|| {
                StorageError::Corrupted(format!("record in {} has no key", image.name))
            })?;
        store.records.insert(key, bytes);
    }

    for spec in image.indexes {
        store.add_index(spec)?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_codec::to_cbor;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_state() -> DatabaseState {
        let mut store = StoreState::new(StoreOptions::auto_increment("id"));
        store.add_index(IndexSpec::on_field("name")).unwrap();
        for (id, name) in [(1, "Marcus"), (2, "Lucius")] {
            let mut m = BTreeMap::new();
            m.insert("id".to_string(), Value::Integer(id));
            m.insert("name".to_string(), Value::from(name));
            store.write(Value::Integer(id), &Value::Map(m)).unwrap();
        }

        let mut state = DatabaseState {
            version: 3,
            stores: BTreeMap::new(),
        };
        state.stores.insert("user".into(), Arc::new(store));
        state
    }

    #[test]
    fn image_survives_save_and_load() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();

        dir.save("app", &sample_state()).unwrap();
        let loaded = dir.load("app").unwrap().unwrap();

        assert_eq!(loaded.version, 3);
        let user = &loaded.stores["user"];
        assert_eq!(user.records.len(), 2);
        assert_eq!(user.next_key, 3);
        assert_eq!(
            user.index_keys("name", &Value::from("Lucius")),
            Some(vec![Value::Integer(2)])
        );
        assert_eq!(dir.image_names().unwrap(), vec!["app".to_string()]);
    }

    #[test]
    fn missing_image_loads_as_none() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();
        assert!(dir.load("nothing").unwrap().is_none());
        assert!(!dir.remove("nothing").unwrap());
    }

    #[test]
    fn garbage_image_is_corruption() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();
        fs::write(temp.path().join("app.shelf"), to_cbor(&Value::Integer(7)).unwrap()).unwrap();
        assert!(matches!(dir.load("app"), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _first = DataDir::open(temp.path()).unwrap();
        let second = DataDir::open(temp.path());
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }
}
