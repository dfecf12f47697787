//! Typed payloads carried by each message kind, and their response data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::MessageBase;
use super::payload::RawPayload;
use super::response::ResponseBase;
use crate::application::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    /// Absent when the application is reached through the connection it
    /// registered on rather than over HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub registration_id: Uuid,
}

impl RegistrationResponse {
    pub fn generate() -> Self {
        Self {
            registration_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregistrationRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregistrationResponse {}

/// Opaque invocation body for the wrapped function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub body: RawPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequestResponse {
    pub body: RawPayload,
}

pub type RegistrationMessage = MessageBase<RegistrationRequest>;
pub type DeregistrationMessage = MessageBase<DeregistrationRequest>;
pub type ForwardRequestMessage = MessageBase<ForwardRequest>;

pub type RegistrationResult = ResponseBase<RegistrationResponse>;
pub type DeregistrationResult = ResponseBase<DeregistrationResponse>;
pub type ForwardRequestResult = ResponseBase<ForwardRequestResponse>;
