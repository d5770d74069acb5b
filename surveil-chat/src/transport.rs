//! Narrow external collaborator: the actual chat-bot SDK. `ChatRoot` drives
//! this trait the way `TelegramRootPlugin` drives `python-telegram-bot`'s
//! `Updater`/`Bot`; everything SDK-specific (polling, parsing updates)
//! stays outside this crate (Non-goal: chat transport SDK).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Identifies an already-uploaded attachment, so a broadcast only uploads
/// once and resends the file id to every other recipient — mirrors
/// `TelegramRootPlugin._broadcast_media`'s `file_id` caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId(pub String);

#[derive(Debug, Error)]
pub enum ChatTransportError {
    /// Transient: request timed out, try again immediately.
    #[error("timed out")]
    TimedOut,
    /// Transient: server asked for backoff of this many seconds.
    #[error("retry after {0}s")]
    RetryAfter(u64),
    /// Transient: generic network failure.
    #[error("network error")]
    NetworkError,
    /// Transient: generic SDK error with a message.
    #[error("{0}")]
    Generic(String),
    /// Fatal: the configured token is not valid. Do not retry.
    #[error("invalid token")]
    InvalidToken,
    /// Fatal: malformed request. Do not retry.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Fatal: not authorized to act on this chat. Do not retry.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The chat moved to a new id (e.g. group → supergroup upgrade).
    /// Caller should update its auth store and retry once against the new id.
    #[error("chat migrated to {0}")]
    ChatMigrated(i64),
}

/// What `_send` actually calls through: a single send primitive per media
/// kind, each either by raw bytes (first upload) or by a cached file id.
pub trait ChatTransport: Send + Sync {
    fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatTransportError>;
    fn send_photo(&self, chat_id: i64, jpeg: &[u8]) -> Result<FileId, ChatTransportError>;
    fn send_photo_by_id(&self, chat_id: i64, file_id: &FileId) -> Result<(), ChatTransportError>;
    fn send_video(&self, chat_id: i64, mp4: &[u8]) -> Result<FileId, ChatTransportError>;
    fn send_video_by_id(&self, chat_id: i64, file_id: &FileId) -> Result<(), ChatTransportError>;
}
