//! File-backed key/value store for client-local state.
//!
//! Holds the few values that outlive a console session: the persisted
//! auth token and the rendered tree depth. Every write is flushed to disk
//! immediately; an in-memory store is available for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub const TOKEN_KEY: &str = "token";
pub const TREE_DEPTH_KEY: &str = "atsDepth";
pub const DEFAULT_TREE_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode local state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened local store");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.into());
        self.persist(&entries)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(path, raw).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Read the rendered tree depth, writing the default back when unset.
///
/// An unparsable stored value is replaced by the default as well.
pub fn load_tree_depth(store: &LocalStore) -> Result<usize, StoreError> {
    match store.get_item(TREE_DEPTH_KEY).map(|raw| raw.trim().parse::<usize>()) {
        Some(Ok(depth)) => Ok(depth),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Stored tree depth is not a number; using default");
            save_tree_depth(store, DEFAULT_TREE_DEPTH)?;
            Ok(DEFAULT_TREE_DEPTH)
        }
        None => {
            save_tree_depth(store, DEFAULT_TREE_DEPTH)?;
            Ok(DEFAULT_TREE_DEPTH)
        }
    }
}

pub fn save_tree_depth(store: &LocalStore, depth: usize) -> Result<(), StoreError> {
    store.set_item(TREE_DEPTH_KEY, depth.to_string())
}
