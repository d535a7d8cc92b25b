//! Key-value persistence for the committed snapshot.
//!
//! The sync controller only talks to the [`KeyValueStore`] port. The file
//! store keeps every key in a single JSON object and replaces the file
//! through a temporary sibling, so a batch of keys lands on disk together.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Minimal persistence port.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value, `None` when the key was never written.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write several keys as one unit.
    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError>;
}

/// Read `key`, falling back to `default` when it is missing or unreadable.
pub fn get<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    match store.load(key) {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Ignoring unreadable stored value for {}: {}", key, e);
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!("Failed to read {} from store: {}", key, e);
            default
        }
    }
}

/// Write a single key.
pub fn set<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    store.set_many(vec![(key.to_string(), serde_json::to_value(value)?)])
}

/// JSON-file backed store.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        let mut state = match self.read_all() {
            Ok(state) => state,
            Err(StoreError::Json(e)) => {
                warn!(
                    "Discarding corrupt state file {}: {}",
                    self.path.display(),
                    e
                );
                Map::new()
            }
            Err(e) => return Err(e),
        };
        for (key, value) in entries {
            state.insert(key, value);
        }

        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, &Value::Object(state))?;
        tmp.persist(&self.path)?;

        debug!("Wrote state file {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, used when no state file is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut state = self.entries.lock();
        for (key, value) in entries {
            state.insert(key, value);
        }
        Ok(())
    }
}
