//! Session Storage - Persistence layer for the local session claim
//!
//! The session id and the user record are kept under two keys of a
//! [`KeyValueStore`]. The presence of the session id is authoritative for
//! "a session is claimed locally".

use adportal_core::{
    redact_session_id, ErrorContext, KeyValueStore, PortalError, PortalResult, StoredSession, User,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Key holding the session identifier
pub const SESSION_ID_KEY: &str = "sessionId";
/// Key holding the JSON-serialized user record
pub const CURRENT_USER_KEY: &str = "currentUser";

/// File name of the [`FileStore`] inside its data directory
pub const SESSION_FILE_NAME: &str = "session.json";

fn poisoned(operation: &str) -> PortalError {
    PortalError::Internal {
        message: "Store lock poisoned".to_string(),
        source: None,
        context: ErrorContext::new("session_storage").with_operation(operation),
    }
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned("get"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("set"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("remove"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store in `data_dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(data_dir: P) -> PortalResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| PortalError::Storage {
            message: format!("Failed to create data directory {}: {}", data_dir.display(), e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("session_storage")
                .with_operation("open")
                .with_suggestion("Check storage.data_dir and its permissions"),
        })?;

        let path = data_dir.join(SESSION_FILE_NAME);
        info!("Session storage initialized at: {}", path.display());

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> PortalResult<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(PortalError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content).map_err(|e| PortalError::Storage {
            message: format!("Corrupt session file {}: {}", self.path.display(), e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("session_storage").with_operation("read"),
        })
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> PortalResult<()> {
        let json_data = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, json_data)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!("Saved session file {}", self.path.display());
        Ok(())
    }

    fn mutate<F>(&self, operation: &str, f: F) -> PortalResult<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.write_lock.lock().map_err(|_| poisoned(operation))?;

        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(PortalError::Storage { message, .. }) => {
                warn!("{}; starting from an empty session file", message);
                Map::new()
            }
            Err(e) => return Err(e),
        };

        f(&mut entries);
        self.write_entries(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let entries = self.read_entries()?;
        Ok(entries
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        self.mutate("set", |entries| {
            entries.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        self.mutate("remove", |entries| {
            entries.remove(key);
        })
    }
}

/// Local session claim on top of a key-value backend
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Session store kept in memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Session store persisted under `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> PortalResult<Self> {
        Ok(Self::new(Arc::new(FileStore::new(data_dir)?)))
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Persist the session id and user record.
    ///
    /// An empty `session_id` leaves the stored id untouched; use
    /// [`SessionStore::clear_session`] to drop a session.
    pub fn set_session(&self, session_id: &str, user: Option<&User>) -> PortalResult<()> {
        if session_id.is_empty() {
            debug!("Empty session id, keeping the stored one");
        } else {
            self.backend.set(SESSION_ID_KEY, session_id)?;
        }

        match user {
            Some(user) => self.set_user(user),
            None => self.backend.remove(CURRENT_USER_KEY),
        }
    }

    /// Replace only the stored user record
    pub fn set_user(&self, user: &User) -> PortalResult<()> {
        let json = serde_json::to_string(user)?;
        self.backend.set(CURRENT_USER_KEY, &json)
    }

    /// Read the stored session.
    ///
    /// Never fails: backend errors yield `None` and an unreadable user record
    /// yields a session without a user, both with a warning.
    pub fn get_session(&self) -> Option<StoredSession> {
        let session_id = match self.backend.get(SESSION_ID_KEY) {
            Ok(Some(session_id)) if !session_id.is_empty() => session_id,
            Ok(_) => return None,
            Err(e) => {
                warn!("Failed to read stored session id: {}", e);
                return None;
            }
        };

        let user = match self.backend.get(CURRENT_USER_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Option<User>>(&raw) {
                Ok(user) => user,
                Err(e) => {
                    warn!(
                        session = %redact_session_id(&session_id),
                        "Discarding unreadable stored user record: {}",
                        e
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read stored user record: {}", e);
                None
            }
        };

        Some(StoredSession { session_id, user })
    }

    /// Remove both fields. Both removals are attempted even if one fails.
    pub fn clear_session(&self) -> PortalResult<()> {
        let id_result = self.backend.remove(SESSION_ID_KEY);
        let user_result = self.backend.remove(CURRENT_USER_KEY);
        id_result.and(user_result)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
