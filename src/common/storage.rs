/// Durable and in-memory key-value storage for revealpoll
///
/// Supports in-memory, JSON file, and Sled backends. Clients keep their vote
/// flag and cached tally here; the server keeps the shared tally record.
use crate::common::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Trait for key-value storage backends
pub trait KVStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

fn poisoned() -> Error {
    Error::Storage("store lock poisoned".into())
}

/// In-memory store
#[derive(Default)]
pub struct MemStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KVStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().map_err(|_| poisoned())?.get(key).cloned())
    }
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn delete(&self, key: &str) -> Result<()> {
        self.map.lock().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

/// Single JSON file holding the whole map.
///
/// Every mutation rewrites the file through a temp file and a rename, so a
/// crash leaves either the old or the new contents.
pub struct FileStore {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let map = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KVStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().map_err(|_| poisoned())?.get(key).cloned())
    }
    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| poisoned())?;
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }
    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| poisoned())?;
        if map.remove(key).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }
}

/// Sled store
#[cfg(feature = "sled-backend")]
pub struct SledStore {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled-backend")]
impl KVStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.db.get(key).map_err(|e| Error::Storage(e.to_string()))?;
        value
            .map(|ivec| {
                String::from_utf8(ivec.to_vec()).map_err(|e| Error::Storage(e.to_string()))
            })
            .transpose()
    }
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key, value.as_bytes())
            .map_err(|e| Error::Storage(e.to_string()))?;
        self.db.flush().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key)
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Which storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    File,
    Sled,
}

impl std::str::FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageKind::Memory),
            "file" | "json" => Ok(StorageKind::File),
            "sled" => Ok(StorageKind::Sled),
            other => Err(Error::InvalidConfig(format!("unknown storage: {}", other))),
        }
    }
}

/// Shared handle over whichever backend was opened
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KVStore>,
}

impl Storage {
    pub fn new_memory() -> Self {
        Self {
            backend: Arc::new(MemStore::new()),
        }
    }

    pub fn new_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(FileStore::open(path)?),
        })
    }

    #[cfg(feature = "sled-backend")]
    pub fn new_sled(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(SledStore::open(path)?),
        })
    }

    /// Open the configured backend. `path` is ignored for memory storage.
    pub fn open(kind: StorageKind, path: &Path) -> Result<Self> {
        match kind {
            StorageKind::Memory => Ok(Self::new_memory()),
            StorageKind::File => Self::new_file(path),
            #[cfg(feature = "sled-backend")]
            StorageKind::Sled => Self::new_sled(path),
            #[cfg(not(feature = "sled-backend"))]
            StorageKind::Sled => Err(Error::InvalidConfig(
                "sled storage requires the sled-backend feature".into(),
            )),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key)
    }
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.backend.put(key, value)
    }
    pub fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, &serde_json::to_string(value)?)
    }
}
