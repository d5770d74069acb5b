//! `TelegramRootPlugin`'s `_send`/`_broadcast_media` retry and classification
//! logic, generalised over [`ChatTransport`] instead of a concrete SDK.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use surveil_auth::AuthStore;

use crate::transport::{ChatTransport, ChatTransportError, FileId};

const DEFAULT_RETRIES: u32 = 3;
const RETRY_CAP_SECS: u64 = 10;

pub struct ChatRoot<T: ChatTransport> {
    transport: Arc<T>,
    auth: Arc<AuthStore>,
}

impl<T: ChatTransport> ChatRoot<T> {
    pub fn new(transport: Arc<T>, auth: Arc<AuthStore>) -> Self {
        ChatRoot { transport, auth }
    }

    /// Classification/backoff per spec.md §4.11/§7: transient errors retry
    /// (rate limit sleeps capped at `RETRY_CAP_SECS`), a chat migration
    /// updates the auth store and continues against the new id, anything
    /// else aborts immediately.
    fn send_with_retry<R>(&self, chat_id: i64, mut op: impl FnMut(i64) -> Result<R, ChatTransportError>) -> Option<R> {
        let mut chat_id = chat_id;
        for attempt in 0..DEFAULT_RETRIES {
            if attempt > 0 {
                log::info!("retrying {}/{}...", attempt + 1, DEFAULT_RETRIES);
            }
            match op(chat_id) {
                Ok(v) => return Some(v),
                Err(ChatTransportError::TimedOut) => {}
                Err(ChatTransportError::NetworkError) => thread::sleep(Duration::from_secs(1)),
                Err(ChatTransportError::Generic(m)) => {
                    log::error!("chat transport error: {}", m);
                    thread::sleep(Duration::from_secs(1));
                }
                Err(ChatTransportError::RetryAfter(secs)) => {
                    let capped = secs.min(RETRY_CAP_SECS);
                    log::error!("asked to retry in {}s, sleeping {}s", secs, capped);
                    thread::sleep(Duration::from_secs(capped));
                }
                Err(ChatTransportError::InvalidToken) => {
                    log::error!("invalid token, will not retry");
                    return None;
                }
                Err(ChatTransportError::BadRequest(m)) => {
                    log::error!("bad request: {}, will not retry", m);
                    return None;
                }
                Err(ChatTransportError::Unauthorized(m)) => {
                    log::error!("unauthorized: {}, will not retry", m);
                    return None;
                }
                Err(ChatTransportError::ChatMigrated(new_id)) => {
                    log::warn!("chat {} moved to {}, updating and retrying", chat_id, new_id);
                    let _ = self.auth.replace_chat_id(chat_id, new_id);
                    chat_id = new_id;
                }
            }
        }
        None
    }

    pub fn send_message(&self, chat_id: i64, text: &str) -> bool {
        self.send_with_retry(chat_id, |cid| self.transport.send_message(cid, text)).is_some()
    }

    pub fn broadcast_message(&self, chat_ids: &[i64], text: &str) -> usize {
        chat_ids.iter().filter(|&&cid| self.send_message(cid, text)).count()
    }

    /// Uploads once, then resends the resulting file id to every other
    /// recipient — `_broadcast_media`.
    pub fn broadcast_photo(&self, chat_ids: &[i64], jpeg: &[u8]) -> usize {
        let mut file_id: Option<FileId> = None;
        let mut sent = 0;
        for &chat_id in chat_ids {
            let ok = match &file_id {
                Some(fid) => self
                    .send_with_retry(chat_id, |cid| self.transport.send_photo_by_id(cid, fid))
                    .is_some(),
                None => match self.send_with_retry(chat_id, |cid| self.transport.send_photo(cid, jpeg)) {
                    Some(fid) => {
                        file_id = Some(fid);
                        true
                    }
                    None => false,
                },
            };
            if ok {
                sent += 1;
            } else if file_id.is_none() {
                log::error!("unable to send photo to chat {}, aborting broadcast", chat_id);
                break;
            }
        }
        sent
    }

    pub fn broadcast_video(&self, chat_ids: &[i64], mp4: &[u8]) -> usize {
        let mut file_id: Option<FileId> = None;
        let mut sent = 0;
        for &chat_id in chat_ids {
            let ok = match &file_id {
                Some(fid) => self
                    .send_with_retry(chat_id, |cid| self.transport.send_video_by_id(cid, fid))
                    .is_some(),
                None => match self.send_with_retry(chat_id, |cid| self.transport.send_video(cid, mp4)) {
                    Some(fid) => {
                        file_id = Some(fid);
                        true
                    }
                    None => false,
                },
            };
            if ok {
                sent += 1;
            } else if file_id.is_none() {
                log::error!("unable to send video to chat {}, aborting broadcast", chat_id);
                break;
            }
        }
        sent
    }

    pub fn authorised_chat_ids(&self) -> Vec<i64> {
        self.auth.authorised_chat_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyTransport {
        fail_times: Mutex<u32>,
    }
    impl ChatTransport for FlakyTransport {
        fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), ChatTransportError> {
            let mut f = self.fail_times.lock().unwrap();
            if *f > 0 {
                *f -= 1;
                Err(ChatTransportError::NetworkError)
            } else {
                Ok(())
            }
        }
        fn send_photo(&self, _chat_id: i64, _jpeg: &[u8]) -> Result<FileId, ChatTransportError> {
            Ok(FileId("abc".into()))
        }
        fn send_photo_by_id(&self, _chat_id: i64, _file_id: &FileId) -> Result<(), ChatTransportError> {
            Ok(())
        }
        fn send_video(&self, _chat_id: i64, _mp4: &[u8]) -> Result<FileId, ChatTransportError> {
            Ok(FileId("vid".into()))
        }
        fn send_video_by_id(&self, _chat_id: i64, _file_id: &FileId) -> Result<(), ChatTransportError> {
            Ok(())
        }
    }

    struct MigratingTransport;
    impl ChatTransport for MigratingTransport {
        fn send_message(&self, chat_id: i64, _text: &str) -> Result<(), ChatTransportError> {
            if chat_id == 42 {
                Err(ChatTransportError::ChatMigrated(99))
            } else {
                Ok(())
            }
        }
        fn send_photo(&self, _chat_id: i64, _jpeg: &[u8]) -> Result<FileId, ChatTransportError> {
            unimplemented!()
        }
        fn send_photo_by_id(&self, _chat_id: i64, _file_id: &FileId) -> Result<(), ChatTransportError> {
            unimplemented!()
        }
        fn send_video(&self, _chat_id: i64, _mp4: &[u8]) -> Result<FileId, ChatTransportError> {
            unimplemented!()
        }
        fn send_video_by_id(&self, _chat_id: i64, _file_id: &FileId) -> Result<(), ChatTransportError> {
            unimplemented!()
        }
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let transport = Arc::new(FlakyTransport { fail_times: Mutex::new(2) });
        let auth = Arc::new(AuthStore::new());
        let root = ChatRoot::new(transport, auth);
        assert!(root.send_message(1, "hi"));
    }

    #[test]
    fn chat_migration_updates_the_auth_store_and_retries_against_the_new_id() {
        let transport = Arc::new(MigratingTransport);
        let auth = Arc::new(AuthStore::new());
        auth.mutate(42, |s| s.start_auth("alice".into())).unwrap();
        let root = ChatRoot::new(transport, auth.clone());
        assert!(root.send_message(42, "hi"));
        // chat 42's record moved to 99; nothing is left behind at 42.
        assert_eq!(auth.status_of(42), surveil_auth::AuthStatus::Unknown);
        assert_eq!(auth.status_of(99), surveil_auth::AuthStatus::Ongoing);
    }

    #[test]
    fn broadcast_photo_uploads_once_and_reuses_the_file_id() {
        let transport = Arc::new(FlakyTransport { fail_times: Mutex::new(0) });
        let auth = Arc::new(AuthStore::new());
        let root = ChatRoot::new(transport, auth);
        let sent = root.broadcast_photo(&[1, 2, 3], b"jpeg-bytes");
        assert_eq!(sent, 3);
    }
}
