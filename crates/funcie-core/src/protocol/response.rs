//! Responses: the single result correlated to a message id.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::payload::RawPayload;
use crate::error::{FuncieError, ProxyError, Result};

/// A response whose success data is typed as `D`.
///
/// At most one of `data` and `error` is set. Neither set is a deliberate
/// empty success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBase<D> {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProxyError>,
    pub received: DateTime<Utc>,
}

/// A response with opaque data, as carried on the wire.
pub type Response = ResponseBase<RawPayload>;

impl<D> ResponseBase<D> {
    /// Build a response. An error always wins over data.
    pub fn new(id: impl Into<String>, data: Option<D>, error: Option<ProxyError>) -> Self {
        let data = if error.is_some() { None } else { data };
        Self {
            id: id.into(),
            data,
            error,
            received: Utc::now().trunc_subsecs(3),
        }
    }

    pub fn success(id: impl Into<String>, data: D) -> Self {
        Self::new(id, Some(data), None)
    }

    pub fn failure(id: impl Into<String>, error: ProxyError) -> Self {
        Self::new(id, None, Some(error))
    }

    /// Proxied error, if any, as a local error value.
    pub fn into_result(self) -> Result<Option<D>> {
        match self.error {
            Some(err) => Err(FuncieError::Proxied(err)),
            None => Ok(self.data),
        }
    }
}

impl<D: Serialize> ResponseBase<D> {
    pub fn marshal(&self) -> Result<Response> {
        let data = self
            .data
            .as_ref()
            .map(RawPayload::encode)
            .transpose()
            .map_err(|e| e.wrap(format!("marshal data of response {}", self.id)))?;
        Ok(ResponseBase {
            id: self.id.clone(),
            data,
            error: self.error.clone(),
            received: self.received,
        })
    }
}

impl Response {
    pub fn unmarshal<D: DeserializeOwned>(&self) -> Result<ResponseBase<D>> {
        let data = self
            .data
            .as_ref()
            .map(|raw| {
                serde_json::from_str(raw.as_str()).map_err(|e| {
                    FuncieError::serialization(format!("unmarshal data of response {}", self.id), e)
                })
            })
            .transpose()?;
        Ok(ResponseBase {
            id: self.id.clone(),
            data,
            error: self.error.clone(),
            received: self.received,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FuncieError::serialization(format!("marshal response {}", self.id), e))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| FuncieError::serialization("unmarshal response", e))
    }
}
