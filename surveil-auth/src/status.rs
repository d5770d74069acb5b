//! `ChatAuthStatus` from the original: per-chat state machine wrapping a
//! [`ChatAuthTransaction`]. Table reproduced from the spec's §4.10.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{AuthAttemptResult, ChatAuthTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStatus {
    Unknown,
    Ongoing,
    Authorized,
    Denied,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("start_auth called while status is not Unknown")]
    AlreadyStarted,
    #[error("try_auth called outside of an ongoing auth transaction")]
    ProtocolViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAuthStatus {
    pub chat_id: i64,
    pub status: AuthStatus,
    pub user: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub transaction: Option<ChatAuthTransaction>,
}

impl ChatAuthStatus {
    pub fn new(chat_id: i64) -> Self {
        ChatAuthStatus {
            chat_id,
            status: AuthStatus::Unknown,
            user: None,
            authorized_at: None,
            transaction: None,
        }
    }

    /// Starts a fresh auth transaction, returning the plaintext password to
    /// relay back to the requester. Only valid from `Unknown`.
    pub fn start_auth(&mut self, user: String) -> Result<String, AuthError> {
        if self.status != AuthStatus::Unknown || self.transaction.is_some() {
            return Err(AuthError::AlreadyStarted);
        }
        let (txn, pwd) = ChatAuthTransaction::generate(self.chat_id, user);
        self.transaction = Some(txn);
        self.status = AuthStatus::Ongoing;
        Ok(pwd)
    }

    /// Feeds a password attempt into the ongoing transaction. Spec.md §4.10:
    /// calling this on an `Authorized` chat (or any non-`Ongoing` status) is
    /// a protocol violation, not a retryable auth result.
    pub fn try_auth(&mut self, pwd: &str) -> Result<AuthAttemptResult, AuthError> {
        if self.status != AuthStatus::Ongoing {
            return Err(AuthError::ProtocolViolation);
        }
        let txn = self.transaction.as_mut().ok_or(AuthError::ProtocolViolation)?;
        let result = txn.authenticate(pwd);
        match result {
            AuthAttemptResult::Authenticated => {
                self.authorized_at = Some(txn.request_time);
                self.user = Some(txn.requested_by.clone());
                self.status = AuthStatus::Authorized;
                self.transaction = None;
            }
            AuthAttemptResult::TooManyRetries | AuthAttemptResult::Expired => {
                self.status = AuthStatus::Denied;
                self.transaction = None;
            }
            AuthAttemptResult::WrongToken | AuthAttemptResult::AlreadyAuthenticated => {}
        }
        Ok(result)
    }

    pub fn revoke_auth(&mut self) {
        self.status = AuthStatus::Unknown;
        self.user = None;
        self.authorized_at = None;
        self.transaction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_auth_flips_to_authorized_and_blocks_reauth() {
        let mut cas = ChatAuthStatus::new(42);
        let pwd = cas.start_auth("alice".into()).unwrap();
        assert_eq!(cas.try_auth(&pwd).unwrap(), AuthAttemptResult::Authenticated);
        assert_eq!(cas.status, AuthStatus::Authorized);
        assert_eq!(cas.user.as_deref(), Some("alice"));
        assert_eq!(cas.try_auth(&pwd).unwrap_err(), AuthError::ProtocolViolation);
    }

    #[test]
    fn too_many_retries_denies_the_chat() {
        let mut cas = ChatAuthStatus::new(7);
        cas.start_auth("bob".into()).unwrap();
        cas.try_auth("x").unwrap();
        cas.try_auth("x").unwrap();
        assert_eq!(cas.try_auth("x").unwrap(), AuthAttemptResult::TooManyRetries);
        assert_eq!(cas.status, AuthStatus::Denied);
    }

    #[test]
    fn revoke_resets_to_unknown_from_any_state() {
        let mut cas = ChatAuthStatus::new(1);
        let pwd = cas.start_auth("carol".into()).unwrap();
        cas.try_auth(&pwd).unwrap();
        cas.revoke_auth();
        assert_eq!(cas.status, AuthStatus::Unknown);
        assert!(cas.user.is_none());
    }

    #[test]
    fn try_auth_without_a_started_transaction_is_a_protocol_violation() {
        let mut cas = ChatAuthStatus::new(1);
        assert_eq!(cas.try_auth("anything").unwrap_err(), AuthError::ProtocolViolation);
    }
}
