//! Persisted last-session state.
//!
//! The chat surface remembers which conversation the user had open so the
//! next mount can restore it. The record is tiny and written on every
//! selection change, so storage is a plain key/value seam with a file-backed
//! and an in-memory implementation.

use crate::error::{ChatError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage key for the last-session record.
pub const SESSION_KEY: &str = "chat-session";

/// What the user last had open.
///
/// Only meaningful for the user named in `owner_user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// The user this record belongs to.
    pub owner_user_id: String,
    /// Last active conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// The other party of the last active or pending conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_user_id: Option<String>,
}

impl PersistedSession {
    /// An empty record for `owner`.
    pub fn new(owner_user_id: impl Into<String>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            conversation_id: None,
            with_user_id: None,
        }
    }

    /// Set the conversation.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set the other party.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.with_user_id = Some(user_id.into());
        self
    }

    /// Whether this record may be restored for `user_id`.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key/value storage
// ─────────────────────────────────────────────────────────────────────────────

/// String key/value storage. Every operation may fail.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` if the key was never written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store files under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChatError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ChatError::Storage(format!("failed to create {}: {}", self.dir.display(), e))
        })?;

        // Write then rename so readers never see a torn file
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                ChatError::Storage(format!("failed to write {}: {}", path.display(), e))
            })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatError::Storage(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Process-local storage, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session record access
// ─────────────────────────────────────────────────────────────────────────────

/// Typed access to the last-session record.
///
/// Loading never fails: unreadable, malformed or foreign records read as
/// absent.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    /// Use `store` under the default key.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: SESSION_KEY.to_string(),
        }
    }

    /// Use a different key, e.g. one per environment.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Load the record if it belongs to `user_id`.
    pub fn load(&self, user_id: &str) -> Option<PersistedSession> {
        let raw = match self.store.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Persisted chat session unreadable, ignoring");
                return None;
            }
        };

        let session: PersistedSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, "Persisted chat session malformed, ignoring");
                return None;
            }
        };

        if !session.is_owned_by(user_id) {
            tracing::debug!(
                owner = %session.owner_user_id,
                user = %user_id,
                "Persisted chat session belongs to another user, ignoring"
            );
            return None;
        }

        Some(session)
    }

    /// Replace the record.
    pub fn save(&self, session: &PersistedSession) -> Result<()> {
        let json = serde_json::to_string(session)
            .map_err(|e| ChatError::Storage(format!("failed to serialize session: {}", e)))?;
        self.store.write(&self.key, &json)
    }

    /// Delete the record.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.key)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("key", &self.key).finish()
    }
}
