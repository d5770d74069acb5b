//! Exposes an [`AuthStore`] over the transport so the CHAT process's
//! command-handling plugins (or a peer process checking who's authorised)
//! can reach it without sharing its address space.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use serde_json::{Map, Value};
use surveil_transport::{RemoteObject, TransportError};

use crate::store::AuthStore;

pub const AUTH_STORE_NAME: &str = "auth_store";

pub struct AuthStoreObject {
    store: Arc<AuthStore>,
}

impl AuthStoreObject {
    pub fn new(store: Arc<AuthStore>) -> Self {
        AuthStoreObject { store }
    }
}

fn arg_i64(args: &[Value], i: usize) -> Result<i64, TransportError> {
    args.get(i)
        .and_then(Value::as_i64)
        .ok_or_else(|| TransportError::NoSuchMethod(AUTH_STORE_NAME.into(), "chat_id argument".into()))
}

fn arg_str<'a>(args: &'a [Value], i: usize) -> Result<&'a str, TransportError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::NoSuchMethod(AUTH_STORE_NAME.into(), "string argument".into()))
}

impl RemoteObject for AuthStoreObject {
    fn call(&self, method: &str, args: Vec<Value>, _kwargs: Map<String, Value>) -> Result<Value, TransportError> {
        match method {
            "status_of" => {
                let chat_id = arg_i64(&args, 0)?;
                Ok(serde_json::to_value(self.store.status_of(chat_id)).unwrap_or(Value::Null))
            }
            "authorised_chat_ids" => Ok(Value::Array(
                self.store.authorised_chat_ids().into_iter().map(Value::from).collect(),
            )),
            "start_auth" => {
                let chat_id = arg_i64(&args, 0)?;
                let user = arg_str(&args, 1)?.to_string();
                let pwd = self
                    .store
                    .mutate(chat_id, |s| s.start_auth(user))
                    .map_err(|e| TransportError::Remote(e.to_string()))?
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::String(pwd))
            }
            "try_auth" => {
                let chat_id = arg_i64(&args, 0)?;
                let pwd = arg_str(&args, 1)?;
                let result = self
                    .store
                    .mutate(chat_id, |s| s.try_auth(pwd))
                    .map_err(|e| TransportError::Remote(e.to_string()))?
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            "revoke_auth" => {
                let chat_id = arg_i64(&args, 0)?;
                self.store
                    .mutate(chat_id, |s| s.revoke_auth())
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            "replace_chat_id" => {
                let old_id = arg_i64(&args, 0)?;
                let new_id = arg_i64(&args, 1)?;
                self.store
                    .replace_chat_id(old_id, new_id)
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            other => Err(TransportError::NoSuchMethod(AUTH_STORE_NAME.into(), other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AuthStatus;

    #[test]
    fn start_and_complete_auth_round_trip_through_the_wire_methods() {
        let object = AuthStoreObject::new(Arc::new(AuthStore::new()));
        let result = object
            .call("start_auth", vec![Value::from(1), Value::String("alice".into())], Map::new())
            .unwrap();
        let pwd = result.as_str().unwrap().to_string();

        let status = object.call("status_of", vec![Value::from(1)], Map::new()).unwrap();
        assert_eq!(status, serde_json::to_value(AuthStatus::Ongoing).unwrap());

        object.call("try_auth", vec![Value::from(1), Value::String(pwd)], Map::new()).unwrap();
        let status = object.call("status_of", vec![Value::from(1)], Map::new()).unwrap();
        assert_eq!(status, serde_json::to_value(AuthStatus::Authorized).unwrap());

        let ids = object.call("authorised_chat_ids", vec![], Map::new()).unwrap();
        assert_eq!(ids, Value::Array(vec![Value::from(1)]));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let object = AuthStoreObject::new(Arc::new(AuthStore::new()));
        let err = object.call("delete_everything", vec![], Map::new()).unwrap_err();
        assert!(matches!(err, TransportError::NoSuchMethod(_, _)));
    }
}
