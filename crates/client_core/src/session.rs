//! Key-value session storage and the session context handed to workflows.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use shared::domain::UserId;
use thiserror::Error;

pub const USER_KEY: &str = "user";
pub const TOKEN_KEY: &str = "token";

/// String-keyed store holding the signed-in user and their token. Values are
/// stored as text; `user` is a JSON document.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub image: Option<SessionImage>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no signed-in user in session store")]
    MissingUser,
    #[error("session user record is malformed: {0}")]
    MalformedUser(#[source] serde_json::Error),
    #[error("session store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

/// Identity a workflow acts under, captured once when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    pub token: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: UserId, token: Option<String>) -> Self {
        Self { user_id, token }
    }

    pub fn from_store(store: &dyn SessionStore) -> Result<Self, SessionError> {
        let user = load_user(store)?.ok_or(SessionError::MissingUser)?;
        let token = store
            .get(TOKEN_KEY)
            .map_err(SessionError::Store)?
            .filter(|token| !token.trim().is_empty());
        Ok(Self {
            user_id: user.id,
            token,
        })
    }
}

pub fn load_user(store: &dyn SessionStore) -> Result<Option<SessionUser>, SessionError> {
    let Some(raw) = store.get(USER_KEY).map_err(SessionError::Store)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(SessionError::MalformedUser)
}

pub fn save_user(store: &dyn SessionStore, user: &SessionUser) -> Result<()> {
    let raw = serde_json::to_string(user)?;
    store.set(USER_KEY, &raw)
}

pub fn clear(store: &dyn SessionStore) -> Result<()> {
    store.remove(USER_KEY)?;
    store.remove(TOKEN_KEY)
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Session store persisted as one JSON object on disk. A missing file reads
/// as an empty session.
pub struct FileSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new())
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read session file '{}'", self.path.display())
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("session file '{}' is not valid JSON", self.path.display()))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create session directory '{}'", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write session file '{}'", self.path.display()))
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("session file lock poisoned"))?;
        let mut entries = self.read_entries()?;
        apply(&mut entries);
        self.write_entries(&entries)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
