//! Messages: units of work sent from a publisher to a consumer.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::RawPayload;
use crate::error::{FuncieError, Result};

/// Discriminator that drives payload decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Register,
    Deregister,
    ForwardRequest,
    Ping,
    Dispatch,
    /// Any kind this build does not know; rejected by processors.
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Register => "REGISTER",
            MessageKind::Deregister => "DEREGISTER",
            MessageKind::ForwardRequest => "FORWARD_REQUEST",
            MessageKind::Ping => "PING",
            MessageKind::Dispatch => "DISPATCH",
            MessageKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message whose payload is typed as `P`.
///
/// The untyped form is [`Message`]; `marshal`/`unmarshal` convert between
/// the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBase<P> {
    pub id: String,
    pub kind: MessageKind,
    pub application: String,
    pub payload: P,
    pub created: DateTime<Utc>,
    /// Encoded as integer nanoseconds.
    #[serde(with = "ttl_nanos")]
    pub ttl: Duration,
}

/// A message with an opaque payload, as carried on the wire.
pub type Message = MessageBase<Option<RawPayload>>;

impl<P> MessageBase<P> {
    /// Build a message with a fresh id and the current time.
    pub fn new(application: impl Into<String>, kind: MessageKind, payload: P, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            application: application.into(),
            payload,
            created: Utc::now().trunc_subsecs(3),
            ttl,
        }
    }
}

impl<P: Serialize> MessageBase<P> {
    /// Encode the typed payload into an untyped [`Message`].
    pub fn marshal(&self) -> Result<Message> {
        let payload = RawPayload::encode(&self.payload)
            .map_err(|e| e.wrap(format!("marshal payload of message {}", self.id)))?;
        Ok(MessageBase {
            id: self.id.clone(),
            kind: self.kind,
            application: self.application.clone(),
            payload: Some(payload),
            created: self.created,
            ttl: self.ttl,
        })
    }
}

impl Message {
    /// Decode the payload as `P`. A missing payload decodes from `null`.
    pub fn unmarshal<P: DeserializeOwned>(&self) -> Result<MessageBase<P>> {
        let raw = self.payload.as_ref().map(RawPayload::as_str).unwrap_or("null");
        let payload = serde_json::from_str(raw).map_err(|e| {
            FuncieError::serialization(
                format!("unmarshal {} payload of message {}", self.kind, self.id),
                e,
            )
        })?;
        Ok(MessageBase {
            id: self.id.clone(),
            kind: self.kind,
            application: self.application.clone(),
            payload,
            created: self.created,
            ttl: self.ttl,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FuncieError::serialization(format!("marshal message {}", self.id), e))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| FuncieError::serialization("unmarshal message", e))
    }
}

mod ttl_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}
