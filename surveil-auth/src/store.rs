//! `ChatAuthStorage` from the original: a chat-id-keyed map of
//! [`ChatAuthStatus`], persisted to `auth.json` as an extended-JSON tagged
//! envelope (spec.md §6/§4.13) on every mutation — the file is the single
//! source of truth across CHAT process restarts.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde_json::Value;
use surveil_codec::{CodecError, Tagged};
use thiserror::Error;

use crate::status::{AuthError, AuthStatus, ChatAuthStatus};

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub struct AuthStore {
    storage: DashMap<i64, ChatAuthStatus>,
    path: Option<PathBuf>,
}

impl AuthStore {
    pub fn new() -> Self {
        AuthStore {
            storage: DashMap::new(),
            path: None,
        }
    }

    /// Loads from `path` if it exists, otherwise starts empty and persists
    /// the first mutation there. A malformed file is renamed aside rather
    /// than failing startup — the store just starts empty, same as a
    /// missing file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthStoreError> {
        let path = path.into();
        let mut store = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            match surveil_codec::loads::<AuthStore>(&text) {
                Ok(store) => store,
                Err(err) => {
                    log::warn!(
                        "auth store at {} is malformed ({err}), renaming it aside and starting empty",
                        path.display()
                    );
                    std::fs::rename(&path, Self::malformed_sibling_path(&path))?;
                    AuthStore::new()
                }
            }
        } else {
            AuthStore::new()
        };
        store.path = Some(path);
        Ok(store)
    }

    fn malformed_sibling_path(path: &Path) -> PathBuf {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let name = format!(
            "{}.malformed-{timestamp}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("auth.json")
        );
        path.with_file_name(name)
    }

    pub fn save(&self) -> Result<(), AuthStoreError> {
        if let Some(path) = &self.path {
            let text = surveil_codec::dumps(self)?;
            std::fs::write(path, text)?;
        }
        Ok(())
    }

    /// Applies `f` to the (possibly freshly created) entry for `chat_id`,
    /// then persists. Mirrors `ChatAuthStorage.__getitem__`'s auto-vivify.
    pub fn mutate<R>(&self, chat_id: i64, f: impl FnOnce(&mut ChatAuthStatus) -> R) -> Result<R, AuthStoreError> {
        let result = {
            let mut entry = self.storage.entry(chat_id).or_insert_with(|| ChatAuthStatus::new(chat_id));
            f(&mut entry)
        };
        self.save()?;
        Ok(result)
    }

    pub fn status_of(&self, chat_id: i64) -> AuthStatus {
        self.storage
            .get(&chat_id)
            .map(|e| e.status)
            .unwrap_or(AuthStatus::Unknown)
    }

    pub fn authorised_chat_ids(&self) -> Vec<i64> {
        self.storage
            .iter()
            .filter(|e| e.status == AuthStatus::Authorized)
            .map(|e| *e.key())
            .collect()
    }

    /// Moves a chat's auth state to a new chat id, mirroring
    /// `plugin_telegram.py`'s handling of a Telegram group-to-supergroup
    /// migration: the record moves, nothing about its auth state changes.
    pub fn replace_chat_id(&self, old_chat_id: i64, new_chat_id: i64) -> Result<(), AuthStoreError> {
        if let Some((_, mut status)) = self.storage.remove(&old_chat_id) {
            status.chat_id = new_chat_id;
            self.storage.insert(new_chat_id, status);
            self.save()?;
        }
        Ok(())
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        AuthStore::new()
    }
}

impl Tagged for AuthStore {
    const TYPE_NAME: &'static str = "ChatAuthStorage";

    fn to_payload(&self) -> Result<Value, CodecError> {
        let mut map = serde_json::Map::new();
        for entry in self.storage.iter() {
            map.insert(entry.key().to_string(), serde_json::to_value(entry.value())?);
        }
        Ok(Value::Object(map))
    }

    fn from_payload(payload: Value) -> Result<Self, CodecError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| CodecError::Malformed(Self::TYPE_NAME.to_string()))?;
        let storage = DashMap::new();
        for (key, value) in obj {
            let chat_id: i64 = key
                .parse()
                .map_err(|_| CodecError::Malformed(Self::TYPE_NAME.to_string()))?;
            let status: ChatAuthStatus = serde_json::from_value(value.clone())?;
            storage.insert(chat_id, status);
        }
        Ok(AuthStore { storage, path: None })
    }
}
