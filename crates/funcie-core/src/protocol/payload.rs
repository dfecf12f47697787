//! Raw JSON payloads.
//!
//! Payloads are kept as `RawValue` so the receiving component decodes them
//! into the type implied by the message kind, and forwards them untouched
//! otherwise.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{FuncieError, Result};

/// Opaque JSON payload bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Box<RawValue>);

impl RawPayload {
    /// Serialize a typed value.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::value::to_raw_value(value)
            .map(Self)
            .map_err(|e| FuncieError::serialization("encode payload", e))
    }

    /// Validate and wrap an already serialized JSON document.
    pub fn from_json(json: impl Into<String>) -> Result<Self> {
        RawValue::from_string(json.into())
            .map(Self)
            .map_err(|e| FuncieError::serialization("parse payload", e))
    }

    /// Validate and wrap raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: Box<RawValue> = serde_json::from_slice(bytes)
            .map_err(|e| FuncieError::serialization("parse payload", e))?;
        Ok(Self(raw))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(self.0.get())
            .map_err(|e| FuncieError::serialization("decode payload", e))
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }
}

impl PartialEq for RawPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for RawPayload {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn keeps_original_text() {
        let raw = RawPayload::from_json(r#"{"b":1, "a":[true]}"#).unwrap();
        assert_eq!(raw.as_str(), r#"{"b":1, "a":[true]}"#);
        let value: serde_json::Value = raw.decode().unwrap();
        assert_eq!(value["a"][0], true);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(RawPayload::from_json("{not json").is_err());
        assert!(RawPayload::from_slice(b"").is_err());
    }
}
