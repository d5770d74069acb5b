//! Extended JSON codec.
//!
//! Plain `serde_json` cannot round-trip a few shapes that cross process
//! boundaries in this system: raw bytes, Unix timestamps, and small enum/
//! record types that travel inside an untyped `Value` (plugin call
//! arguments, chat auth persistence). This crate gives those shapes a tagged
//! envelope, `{"__type": "TypeName", "TypeName": payload}`, matching the
//! wire format used across process boundaries elsewhere in this codebase.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const TYPE_KEY: &str = "__type";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unknown tagged type: {0}")]
    UnknownType(String),
    #[error("malformed envelope for type {0}")]
    Malformed(String),
}

/// A type that can appear wrapped in a tagged envelope.
pub trait Tagged: Sized {
    const TYPE_NAME: &'static str;
    fn to_payload(&self) -> Result<Value, CodecError>;
    fn from_payload(payload: Value) -> Result<Self, CodecError>;
}

pub fn wrap<T: Tagged>(value: &T) -> Result<Value, CodecError> {
    let payload = value.to_payload()?;
    let mut map = serde_json::Map::new();
    map.insert(TYPE_KEY.to_string(), Value::String(T::TYPE_NAME.to_string()));
    map.insert(T::TYPE_NAME.to_string(), payload);
    Ok(Value::Object(map))
}

pub fn unwrap<T: Tagged>(value: &Value) -> Result<T, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::Malformed(T::TYPE_NAME.to_string()))?;
    let declared = obj
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed(T::TYPE_NAME.to_string()))?;
    if declared != T::TYPE_NAME {
        return Err(CodecError::UnknownType(declared.to_string()));
    }
    let payload = obj
        .get(T::TYPE_NAME)
        .cloned()
        .ok_or_else(|| CodecError::Malformed(T::TYPE_NAME.to_string()))?;
    T::from_payload(payload)
}

/// Bytes wrapped as `{"__type": "bytes", "bytes": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBytes(pub Vec<u8>);

impl Tagged for RawBytes {
    const TYPE_NAME: &'static str = "bytes";

    fn to_payload(&self) -> Result<Value, CodecError> {
        use base64::{engine::general_purpose, Engine as _};
        Ok(Value::String(general_purpose::STANDARD.encode(&self.0)))
    }

    fn from_payload(payload: Value) -> Result<Self, CodecError> {
        use base64::{engine::general_purpose, Engine as _};
        let s = payload
            .as_str()
            .ok_or_else(|| CodecError::Malformed(Self::TYPE_NAME.to_string()))?;
        Ok(RawBytes(general_purpose::STANDARD.decode(s)?))
    }
}

/// A Unix timestamp wrapped as `{"__type": "datetime", "datetime": <f64 secs>}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Tagged for Timestamp {
    const TYPE_NAME: &'static str = "datetime";

    fn to_payload(&self) -> Result<Value, CodecError> {
        Ok(serde_json::json!(self.0))
    }

    fn from_payload(payload: Value) -> Result<Self, CodecError> {
        payload
            .as_f64()
            .map(Timestamp)
            .ok_or_else(|| CodecError::Malformed(Self::TYPE_NAME.to_string()))
    }
}

/// Serialises any `Serialize + Tagged` value to a JSON string via its
/// tagged envelope, mirroring `ExtendedJSONCodec.default`/`.hook` used
/// throughout the original plugin call marshalling.
pub fn dumps<T: Tagged>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&wrap(value)?)?)
}

pub fn loads<T: Tagged>(s: &str) -> Result<T, CodecError> {
    let value: Value = serde_json::from_str(s)?;
    unwrap(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let original = RawBytes(vec![0, 1, 2, 255, 254]);
        let s = dumps(&original).unwrap();
        assert!(s.contains("\"__type\":\"bytes\""));
        let back: RawBytes = loads(&s).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn timestamp_round_trip() {
        let original = Timestamp(1_700_000_000.5);
        let s = dumps(&original).unwrap();
        let back: Timestamp = loads(&s).unwrap();
        assert_eq!(original.0, back.0);
    }

    #[test]
    fn wrong_type_tag_is_rejected() {
        let original = RawBytes(vec![1, 2, 3]);
        let wrapped = wrap(&original).unwrap();
        let err = unwrap::<Timestamp>(&wrapped).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(_)));
    }
}
