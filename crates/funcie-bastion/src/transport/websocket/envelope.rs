//! Envelope framing both directions of traffic on one socket.
//!
//! Wire shape: `{"kind": 1 | 2, "data": <Message | Response>}`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use funcie_core::{FuncieError, Message, RawPayload, Response, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Request = 1,
    Response = 2,
}

impl Serialize for EnvelopeKind {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for EnvelopeKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        match u8::deserialize(d)? {
            1 => Ok(EnvelopeKind::Request),
            2 => Ok(EnvelopeKind::Response),
            other => Err(D::Error::custom(format!("unknown envelope kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub data: RawPayload,
}

impl Envelope {
    pub fn request(message: &Message) -> Result<Self> {
        Ok(Self {
            kind: EnvelopeKind::Request,
            data: RawPayload::encode(message)
                .map_err(|e| e.wrap(format!("wrap message {}", message.id)))?,
        })
    }

    pub fn response(response: &Response) -> Result<Self> {
        Ok(Self {
            kind: EnvelopeKind::Response,
            data: RawPayload::encode(response)
                .map_err(|e| e.wrap(format!("wrap response {}", response.id)))?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FuncieError::serialization("encode envelope", e))
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FuncieError::serialization("decode envelope", e))
    }

    pub fn decode_message(&self) -> Result<Message> {
        self.data.decode().map_err(|e| e.wrap("decode enveloped message"))
    }

    pub fn decode_response(&self) -> Result<Response> {
        self.data.decode().map_err(|e| e.wrap("decode enveloped response"))
    }
}
