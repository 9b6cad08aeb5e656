use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use wf_core::{Error, KeyValueStore, Result};

pub mod backends;

pub use backends::*;

pub const DEFAULT_NAMESPACE: &str = "wikifeed";

/// Every key the feed persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Likes,
    Seen,
    Preferences,
    CategoryScores,
    ArticleCache,
    CacheTimestamps,
    Saved,
}

impl StorageKey {
    pub const ALL: [StorageKey; 7] = [
        StorageKey::Likes,
        StorageKey::Seen,
        StorageKey::Preferences,
        StorageKey::CategoryScores,
        StorageKey::ArticleCache,
        StorageKey::CacheTimestamps,
        StorageKey::Saved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Likes => "likes",
            StorageKey::Seen => "seen",
            StorageKey::Preferences => "prefs",
            StorageKey::CategoryScores => "cat_scores",
            StorageKey::ArticleCache => "cache",
            StorageKey::CacheTimestamps => "cache_ts",
            StorageKey::Saved => "saved",
        }
    }
}

/// Which [`KeyValueStore`] implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" | "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(Error::InvalidConfig(format!("Unknown storage backend: {}", other))),
        }
    }
}

pub fn create_storage(kind: BackendKind, data_dir: &Path) -> Result<Arc<dyn KeyValueStore>> {
    match kind {
        BackendKind::Memory => Ok(Arc::new(InMemoryStore::new())),
        BackendKind::Sqlite => Ok(Arc::new(SqliteStore::open(data_dir)?)),
    }
}

/// Namespaced, JSON-typed view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_namespace(backend, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(backend: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    /// Store over a fresh [`InMemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn full_key(&self, key: StorageKey) -> String {
        format!("{}_{}", self.namespace, key.as_str())
    }

    pub fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>> {
        match self.backend.get(&self.full_key(key))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read `key`, treating absent or unreadable data as the default value
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: StorageKey) -> T {
        match self.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!("Storage get error for {}: {}", self.full_key(key), e);
                T::default()
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(&self.full_key(key), &raw).map_err(|e| {
            warn!("Storage set error for {}: {}", self.full_key(key), e);
            e
        })
    }

    pub fn delete(&self, key: StorageKey) -> Result<()> {
        self.backend.remove(&self.full_key(key))
    }

    /// Remove every feed key. Keys are independent, so a failure on one does
    /// not stop the others; the first error is returned.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_error = None;
        for key in StorageKey::ALL {
            if let Err(e) = self.delete(key) {
                warn!("Failed to clear {}: {}", self.full_key(key), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn used_bytes(&self) -> Result<usize> {
        self.backend.used_bytes()
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, BackendKind, PersistentStore, StorageKey};
}
