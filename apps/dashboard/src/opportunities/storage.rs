//! Local key-value persistence for dashboard state.
//!
//! Values are JSON strings under fixed keys, mirroring browser local storage:
//! every write is a full read-modify-write of the backing map and is refused
//! when the map would grow past the configured byte quota.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: writing '{key}' needs {needed} bytes, quota is {quota} bytes")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The persisted keys, one JSON document each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
    Favorites,
    FavoriteChats,
    OpportunityStates,
    UnreadItems,
    UndecidedItems,
    RejectedItems,
}

impl StateKey {
    pub const ALL: [StateKey; 6] = [
        StateKey::Favorites,
        StateKey::FavoriteChats,
        StateKey::OpportunityStates,
        StateKey::UnreadItems,
        StateKey::UndecidedItems,
        StateKey::RejectedItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Favorites => "favorites",
            StateKey::FavoriteChats => "favoriteChats",
            StateKey::OpportunityStates => "opportunityStates",
            StateKey::UnreadItems => "unreadItems",
            StateKey::UndecidedItems => "undecidedItems",
            StateKey::RejectedItems => "rejectedItems",
        }
    }
}

/// Synchronous string key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
}

fn check_quota(
    map: &BTreeMap<String, String>,
    key: &str,
    quota: Option<usize>,
) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let needed: usize = map.iter().map(|(k, v)| k.len() + v.len()).sum();
    if needed > quota {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            needed,
            quota,
        });
    }
    Ok(())
}

/// A single JSON file holding every key.
pub struct JsonFileStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, quota_bytes: Option<usize>) -> Self {
        Self {
            path: path.into(),
            quota_bytes,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => Ok(map),
                Err(e) => {
                    warn!("State file {} is corrupt, starting empty: {e}", self.path.display());
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);
        check_quota(&map, key, self.quota_bytes)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Persisted '{key}' to {}", self.path.display());
        Ok(())
    }
}

/// In-process store. Used when no state file is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new(quota_bytes: Option<usize>) -> Self {
        Self {
            map: Mutex::new(BTreeMap::new()),
            quota_bytes,
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        let previous = map.insert(key.to_string(), value);
        if let Err(e) = check_quota(&map, key, self.quota_bytes) {
            match previous {
                Some(v) => map.insert(key.to_string(), v),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
