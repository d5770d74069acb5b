//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod pwgen;
pub mod remote;
pub mod status;
pub mod store;
pub mod transaction;

pub use pwgen::generate_password;
pub use remote::{AuthStoreObject, AUTH_STORE_NAME};
pub use status::{AuthError, AuthStatus, ChatAuthStatus};
pub use store::{AuthStore, AuthStoreError};
pub use transaction::{AuthAttemptResult, ChatAuthTransaction, MAX_PWD_LIFE_SECS, MAX_RETRIES};
