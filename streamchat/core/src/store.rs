//! Persistence Adapter
//!
//! The client never talks to a storage engine directly. It consumes a narrow
//! key-value capability, [`KeyValueStore`], injected at construction. Two
//! scopes exist:
//!
//! - **session**: forgotten when the process exits (continuation tokens)
//! - **durable**: survives restarts (settings, legacy prompt, user id)
//!
//! # Keys
//!
//! | Key                        | Scope   |
//! |----------------------------|---------|
//! | `conversationId_<context>` | session |
//! | `customSettings_<context>` | durable |
//! | `customPrompt_<context>`   | durable |
//! | `userId`                   | durable |

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

use crate::messages::ContextKey;

/// Errors from a key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// The I/O error
        source: io::Error,
    },

    /// Stored data could not be decoded
    #[error("corrupt store {path}: {source}")]
    Corrupt {
        /// File being decoded
        path: PathBuf,
        /// The JSON error
        source: serde_json::Error,
    },
}

/// Narrow key-value capability
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write several values atomically: either all land or none do
    fn save_batch(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Delete a value (missing keys are not an error)
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Write a single value
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.save_batch(&[(key, value)])
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn save_batch(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Durable store backed by a single JSON object on disk
///
/// Every write rewrites the file through a sibling temp file and a rename, so
/// a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::debug!(path = ?path, keys = entries.len(), "Opened file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save_batch(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        let mut next = map.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        if !map.contains_key(key) {
            return Ok(());
        }
        let mut next = map.clone();
        next.remove(key);
        self.persist(&next)?;
        *map = next;
        Ok(())
    }
}

/// Documented persistence keys
pub mod keys {
    use crate::messages::ContextKey;

    /// Process-lifetime user identifier (durable)
    pub const USER_ID: &str = "userId";

    /// Continuation token for a context (session)
    #[must_use]
    pub fn conversation_id(context: &ContextKey) -> String {
        format!("conversationId_{context}")
    }

    /// Structured prompt settings for a context (durable)
    #[must_use]
    pub fn custom_settings(context: &ContextKey) -> String {
        format!("customSettings_{context}")
    }

    /// Flat prompt string for a context (durable, legacy format)
    #[must_use]
    pub fn custom_prompt(context: &ContextKey) -> String {
        format!("customPrompt_{context}")
    }
}

/// Session and durable stores handed to the client
#[derive(Clone)]
pub struct Persistence {
    /// Forgotten when the process exits
    pub session: Arc<dyn KeyValueStore>,
    /// Survives restarts
    pub durable: Arc<dyn KeyValueStore>,
}

impl Persistence {
    /// Build from two stores
    pub fn new(session: Arc<dyn KeyValueStore>, durable: Arc<dyn KeyValueStore>) -> Self {
        Self { session, durable }
    }

    /// Both scopes in memory (tests, ephemeral runs)
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Load the persisted continuation token for a context
    pub fn continuation_token(&self, context: &ContextKey) -> Result<Option<String>, StoreError> {
        Ok(self
            .session
            .load(&keys::conversation_id(context))?
            .filter(|token| !token.is_empty()))
    }

    /// Return the persisted user id, generating and saving one on first use
    pub fn ensure_user_id(&self) -> Result<String, StoreError> {
        if let Some(id) = self.durable.load(keys::USER_ID)?.filter(|id| !id.is_empty()) {
            return Ok(id);
        }

        let id = generate_user_id();
        self.durable.save(keys::USER_ID, &id)?;
        tracing::info!(user_id = %id, "Generated new user id");
        Ok(id)
    }
}

fn generate_user_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("user_{}_{suffix}", chrono::Utc::now().timestamp_millis())
}
