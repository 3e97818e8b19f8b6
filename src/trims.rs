// Persistent trim storage
//
// The controller only needs get-by-name with a default and set-by-name. A JSON
// file per namespace backs the runtime; an in-memory map backs tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::messages::Trims;
use crate::motion::ChannelId;

/// Error types for trim persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed trim file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Named integer store
pub trait TrimStore: Send {
    fn get(&self, key: &str, default: i32) -> i32;

    fn set(&mut self, key: &str, value: i32) -> Result<(), StoreError>;
}

/// Read all six trims, missing keys default to 0
pub fn load_trims(store: &dyn TrimStore) -> Trims {
    let mut trims = Trims::default();
    for id in ChannelId::ALL {
        trims.set(id, store.get(id.name(), 0));
    }
    trims
}

/// Volatile store, forgets everything on drop
#[derive(Debug, Clone, Default)]
pub struct MemoryTrimStore {
    values: BTreeMap<String, i32>,
}

impl MemoryTrimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrimStore for MemoryTrimStore {
    fn get(&self, key: &str, default: i32) -> i32 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON file `<dir>/<namespace>.json`, loaded once and written through on set
#[derive(Debug)]
pub struct JsonTrimStore {
    path: PathBuf,
    values: BTreeMap<String, i32>,
}

impl JsonTrimStore {
    /// Open the namespace, starting empty when the file does not exist yet
    pub fn open(dir: &Path, namespace: &str) -> Result<Self, StoreError> {
        let path = dir.join(format!("{}.json", namespace));
        let values = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        info!("Loaded {} trim values from {}", values.len(), path.display());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.values).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl TrimStore for JsonTrimStore {
    fn get(&self, key: &str, default: i32) -> i32 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        debug!("Persisting {} = {} to {}", key, value, self.path.display());
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}
