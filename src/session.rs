//! Durable per-profile session identity.
//!
//! The chat service keys its server-side transcript on an opaque session id
//! minted here. The id lives in a small key/value file (the local analogue of
//! browser storage) and survives restarts; conversation history does not.

use crate::utils::ensure_dir;
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The single durable key holding the chat session id.
pub const SESSION_ID_KEY: &str = "tea-chat-session-id";

/// Durable client-side key/value storage.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

// ── File-backed storage ─────────────────────────────────────────────────

/// JSON object on disk, rewritten whole on every change.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/tea-dashboard/storage.json`, when the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("tea-dashboard").join("storage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents; `None` when the file does not exist yet.
    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read storage file {}", self.path.display())),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match self.read_raw()? {
            Some(contents) => parse_entries(&contents)
                .with_context(|| format!("Corrupt storage file {}", self.path.display())),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write storage file {}", self.path.display()))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    /// A corrupt file is replaced by an empty map so that removing a key
    /// always leaves the storage readable.
    fn remove(&self, key: &str) -> Result<()> {
        let Some(contents) = self.read_raw()? else {
            return Ok(());
        };
        match parse_entries(&contents) {
            Ok(mut entries) => {
                if entries.remove(key).is_some() {
                    self.write_all(&entries)?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding corrupt storage file"
                );
                self.write_all(&BTreeMap::new())
            }
        }
    }
}

fn parse_entries(contents: &str) -> serde_json::Result<BTreeMap<String, String>> {
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(contents)
}

// ── In-memory storage ───────────────────────────────────────────────────

/// Process-local storage for tests and for platforms without a data dir.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("in-memory storage lock poisoned"))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ── Session identity ────────────────────────────────────────────────────

/// Derives and persists the stable per-profile session identifier.
#[derive(Clone)]
pub struct SessionIdentityStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SessionIdentityStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Return the stored id, minting and persisting a v4 UUID on first use.
    pub fn get_session_id(&self) -> Result<String> {
        let stored = self
            .storage
            .get(SESSION_ID_KEY)?
            .filter(|id| !id.trim().is_empty());
        if let Some(id) = stored {
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        self.storage
            .set(SESSION_ID_KEY, &id)
            .context("Failed to persist session id")?;
        info!(session_id = %id, "minted new chat session id");
        Ok(id)
    }

    /// Forget the stored id so the next [`get_session_id`](Self::get_session_id) mints a new one.
    pub fn clear(&self) -> Result<()> {
        debug!("clearing stored chat session id");
        self.storage.remove(SESSION_ID_KEY)
    }

    /// Clear the stored id and return a freshly minted one.
    pub fn reset_session_id(&self) -> Result<String> {
        self.clear()?;
        self.get_session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_store() -> SessionIdentityStore {
        SessionIdentityStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_session_id_is_stable() {
        let store = memory_store();
        let first = store.get_session_id().unwrap();
        let second = store.get_session_id().unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(Uuid::parse_str(&first).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_reset_mints_new_id() {
        let store = memory_store();
        let first = store.get_session_id().unwrap();
        let reset = store.reset_session_id().unwrap();
        assert_ne!(first, reset);
        assert_eq!(store.get_session_id().unwrap(), reset);
    }

    #[test]
    fn test_blank_stored_value_is_replaced() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SESSION_ID_KEY, "   ").unwrap();
        let store = SessionIdentityStore::new(storage.clone());
        let id = store.get_session_id().unwrap();
        assert!(!id.trim().is_empty());
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap(), Some(id));
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let id = SessionIdentityStore::new(Arc::new(FileStorage::new(&path)))
            .get_session_id()
            .unwrap();
        assert!(path.exists());

        // A second store over the same file sees the same id
        let reopened = SessionIdentityStore::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(reopened.get_session_id().unwrap(), id);
    }

    #[test]
    fn test_file_storage_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("storage.json"));
        storage.set("theme", "dark").unwrap();
        storage.set(SESSION_ID_KEY, "abc").unwrap();
        storage.remove(SESSION_ID_KEY).unwrap();

        assert_eq!(storage.get(SESSION_ID_KEY).unwrap(), None);
        assert_eq!(storage.get("theme").unwrap(), Some("dark".to_string()));
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap(), None);
        // Removing from a missing file does not create it
        storage.remove(SESSION_ID_KEY).unwrap();
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_file_storage_corrupt_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();
        let store = SessionIdentityStore::new(Arc::new(FileStorage::new(&path)));
        let err = store.get_session_id().unwrap_err();
        assert!(err.to_string().contains("Corrupt storage file"));
    }

    #[test]
    fn test_reset_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();
        let store = SessionIdentityStore::new(Arc::new(FileStorage::new(&path)));
        assert!(store.get_session_id().is_err());

        let id = store.reset_session_id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.get_session_id().unwrap(), id);

        // The file is valid JSON again
        let reopened = SessionIdentityStore::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(reopened.get_session_id().unwrap(), id);
    }
}
