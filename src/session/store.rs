//! Session storage.
//!
//! The session (token + admin identity) is the one piece of state shared by
//! every request. It is reached through the [`SessionStore`] capability so
//! the transport never depends on a process-wide singleton.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::error::StoreError;
use crate::config::Config;
use crate::model::User;

/// An authenticated admin session. Token and user always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub auth_token: String,
    pub user: User,
    pub message: Option<String>,
}

/// Get/set/subscribe access to the current session.
pub trait SessionStore: Send + Sync + 'static {
    fn get(&self) -> Option<Session>;

    /// Replace the session; `None` logs out.
    fn set(&self, session: Option<Session>) -> Result<(), StoreError>;

    fn subscribe(&self) -> watch::Receiver<Option<Session>>;

    fn token(&self) -> Option<String> {
        self.get().map(|s| s.auth_token)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.set(None)
    }

    /// Swap in a refreshed token, keeping the rest of the session.
    ///
    /// Returns `false` when there is no session to update.
    fn replace_token(&self, token: String) -> Result<bool, StoreError> {
        match self.get() {
            Some(mut session) => {
                session.auth_token = token;
                self.set(Some(session))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Swap the token in place under the channel's lock. A session cleared
/// meanwhile stays cleared.
fn swap_token(current: &watch::Sender<Option<Session>>, token: String) -> bool {
    current.send_if_modified(|session| match session {
        Some(session) => {
            session.auth_token = token;
            true
        }
        None => false,
    })
}

/// In-memory store, for tests and short-lived tools.
#[derive(Debug)]
pub struct MemoryStore {
    current: watch::Sender<Option<Session>>,
}

impl MemoryStore {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            current: watch::Sender::new(session),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    fn set(&self, session: Option<Session>) -> Result<(), StoreError> {
        self.current.send_replace(session);
        Ok(())
    }

    fn replace_token(&self, token: String) -> Result<bool, StoreError> {
        Ok(swap_token(&self.current, token))
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBlob {
    state: PersistedState,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredShape {
    Current(PersistedBlob),
    /// Flat `{authToken, ...}` written by older clients.
    Legacy(PersistedState),
}

impl PersistedState {
    fn into_session(self) -> Option<Session> {
        match (self.auth_token, self.user) {
            (Some(auth_token), Some(user)) if !auth_token.is_empty() => Some(Session {
                auth_token,
                user,
                message: self.message,
            }),
            (Some(_), None) => {
                warn!("stored token has no user, ignoring it");
                None
            }
            _ => None,
        }
    }

    fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(s) => Self {
                auth_token: Some(s.auth_token.clone()),
                user: Some(s.user.clone()),
                message: s.message.clone(),
            },
            None => Self::default(),
        }
    }
}

/// Durable store: one JSON blob named after the storage key, in the
/// nested `{"state": {...}}` shape.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    current: watch::Sender<Option<Session>>,
}

impl FileStore {
    /// Open `<dir>/<name>.json`, rehydrating any saved session.
    ///
    /// Legacy flat blobs are rewritten in the nested shape. An unreadable
    /// blob is treated as logged out.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        Self::open_path(dir.as_ref().join(format!("{name}.json")))
    }

    /// Open the blob at [`Config::storage_path`].
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::open_path(config.storage_path())
    }

    fn open_path(path: PathBuf) -> Result<Self, StoreError> {
        let store = Self {
            path,
            current: watch::Sender::new(None),
        };

        let (session, migrate) = store.read_blob()?;
        store.current.send_replace(session);
        if migrate {
            debug!(path = %store.path.display(), "migrating legacy session blob");
            store.write_blob()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_blob(&self) -> Result<(Option<Session>, bool), StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((None, false)),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredShape>(&raw) {
            Ok(StoredShape::Current(blob)) => Ok((blob.state.into_session(), false)),
            Ok(StoredShape::Legacy(state)) => Ok((state.into_session(), true)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable session blob, starting logged out");
                Ok((None, false))
            }
        }
    }

    fn write_blob(&self) -> Result<(), StoreError> {
        let blob = PersistedBlob {
            state: PersistedState::from_session(self.current.borrow().as_ref()),
            version: 0,
        };
        let json = serde_json::to_vec_pretty(&blob)?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Write-then-rename so a crash never leaves half a blob behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    fn set(&self, session: Option<Session>) -> Result<(), StoreError> {
        self.current.send_replace(session);
        self.write_blob()
    }

    fn replace_token(&self, token: String) -> Result<bool, StoreError> {
        if !swap_token(&self.current, token) {
            return Ok(false);
        }
        self.write_blob()?;
        Ok(true)
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}
