//! `ChatAuthTransaction` from the original: a one-shot password challenge
//! with a retry budget and an expiry window.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::pwgen::generate_password;

pub const MAX_RETRIES: u32 = 3;
pub const MAX_PWD_LIFE_SECS: i64 = 180;
const PASSWORD_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthAttemptResult {
    Authenticated,
    AlreadyAuthenticated,
    TooManyRetries,
    WrongToken,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAuthTransaction {
    pub chat_id: i64,
    pub requested_by: String,
    pub request_time: DateTime<Utc>,
    pub retries: u32,
    pub password_hash: Option<String>,
}

impl ChatAuthTransaction {
    /// Generates a fresh transaction plus the plaintext password (returned
    /// once, to be relayed to whoever requested auth — never stored).
    pub fn generate(chat_id: i64, requested_by: String) -> (Self, String) {
        let pwd = generate_password(PASSWORD_LENGTH);
        let hash = bcrypt::hash(&pwd, bcrypt::DEFAULT_COST).expect("bcrypt hashing failed");
        let txn = ChatAuthTransaction {
            chat_id,
            requested_by,
            request_time: Utc::now(),
            retries: 0,
            password_hash: Some(hash),
        };
        (txn, pwd)
    }

    /// `retries ∈ [0, MAX_RETRIES]`; `password_hash = NULL` iff concluded.
    pub fn is_concluded(&self) -> bool {
        self.password_hash.is_none()
    }

    pub fn authenticate(&mut self, pwd: &str) -> AuthAttemptResult {
        let hash = match &self.password_hash {
            None => return AuthAttemptResult::AlreadyAuthenticated,
            Some(h) => h.clone(),
        };
        if self.retries >= MAX_RETRIES {
            self.password_hash = None;
            return AuthAttemptResult::TooManyRetries;
        }
        if Utc::now() - self.request_time > Duration::seconds(MAX_PWD_LIFE_SECS) {
            self.password_hash = None;
            return AuthAttemptResult::Expired;
        }
        if bcrypt::verify(pwd, &hash).unwrap_or(false) {
            self.password_hash = None;
            return AuthAttemptResult::Authenticated;
        }
        self.retries += 1;
        if self.retries >= MAX_RETRIES {
            self.password_hash = None;
            AuthAttemptResult::TooManyRetries
        } else {
            AuthAttemptResult::WrongToken
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_authenticates_and_concludes_the_transaction() {
        let (mut txn, pwd) = ChatAuthTransaction::generate(42, "alice".into());
        assert_eq!(txn.authenticate(&pwd), AuthAttemptResult::Authenticated);
        assert!(txn.is_concluded());
    }

    #[test]
    fn wrong_password_increments_retries_until_the_cap() {
        let (mut txn, _pwd) = ChatAuthTransaction::generate(42, "alice".into());
        assert_eq!(txn.authenticate("nope"), AuthAttemptResult::WrongToken);
        assert_eq!(txn.authenticate("nope"), AuthAttemptResult::WrongToken);
        assert_eq!(txn.authenticate("nope"), AuthAttemptResult::TooManyRetries);
        assert!(txn.is_concluded());
    }

    #[test]
    fn expired_transaction_is_denied_regardless_of_password() {
        let (mut txn, pwd) = ChatAuthTransaction::generate(42, "alice".into());
        txn.request_time = Utc::now() - Duration::seconds(MAX_PWD_LIFE_SECS + 1);
        assert_eq!(txn.authenticate(&pwd), AuthAttemptResult::Expired);
    }

    #[test]
    fn already_concluded_transaction_rejects_further_attempts() {
        let (mut txn, pwd) = ChatAuthTransaction::generate(42, "alice".into());
        txn.authenticate(&pwd);
        assert_eq!(txn.authenticate(&pwd), AuthAttemptResult::AlreadyAuthenticated);
    }
}
