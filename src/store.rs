//! Key-value persistence for the display settings and mode configurations.
//!
//! Each document is a flat JSON record. A missing document is a valid
//! "not configured yet" state.

use crate::config::write_atomic;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const SETTINGS_KEY: &str = "settings";
pub const SLIDESHOW_KEY: &str = "slideshow";
pub const FEED_KEY: &str = "feed";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored document '{key}' is not valid: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence collaborator
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    fn put(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError>;
}

/// Read and deserialize a document
pub fn load<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write a document
pub fn save<T: Serialize>(store: &dyn Store, key: &str, document: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(document).map_err(|source| StoreError::Json {
        key: key.to_string(),
        source,
    })?;
    store.put(key, &value)
}

/// One pretty-printed `<key>.json` file per document
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, making the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let content = match std::fs::read_to_string(self.path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No stored '{}' document found", key);
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn put(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(document).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;

        write_atomic(&self.path(key), content.as_bytes()).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })?;

        tracing::debug!("Stored '{}' to {}", key, self.path(key).display());
        Ok(())
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.documents.lock().get(key).cloned())
    }

    fn put(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        self.documents.lock().insert(key.to_string(), document.clone());
        Ok(())
    }
}
