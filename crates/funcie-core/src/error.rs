//! Shared error type across funcie crates.
//!
//! Errors that cross a process boundary travel as [`ProxyError`], which keeps
//! the message text and an explicit [`ErrorCode`] so the receiving side can
//! branch on the code instead of comparing strings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes carried alongside proxied errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No subscriber or connection is present for the application.
    NoActiveConsumer,
    /// Registry lookup miss.
    ApplicationNotFound,
    /// Consumer-side router has no handler for the application.
    NoHandlerFound,
    /// Message kind not supported by the receiver.
    UnknownMessageKind,
    /// Timed out waiting for a response.
    TtlExceeded,
    /// Payload could not be encoded or decoded.
    BadPayload,
    /// Operation not supported by this side of the bastion.
    Unsupported,
    /// Anything else, including errors from peers that predate codes.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// String representation used in JSON payloads and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoActiveConsumer => "NO_ACTIVE_CONSUMER",
            ErrorCode::ApplicationNotFound => "APPLICATION_NOT_FOUND",
            ErrorCode::NoHandlerFound => "NO_HANDLER_FOUND",
            ErrorCode::UnknownMessageKind => "UNKNOWN_MESSAGE_KIND",
            ErrorCode::TtlExceeded => "TTL_EXCEEDED",
            ErrorCode::BadPayload => "BAD_PAYLOAD",
            ErrorCode::Unsupported => "UNSUPPORTED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, FuncieError>;

/// Unified error type used by core and bastion.
#[derive(Debug, Error)]
pub enum FuncieError {
    #[error("no consumer is active on this tunnel")]
    NoActiveConsumer,
    #[error("application not found: {0}")]
    ApplicationNotFound(String),
    #[error("no handler found for application {0}")]
    NoHandlerFound(String),
    #[error("handler already registered for application {0}")]
    HandlerAlreadyRegistered(String),
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(String),
    #[error("pubsub channel closed")]
    PubSubChannelClosed,
    #[error("ttl of {ttl:?} exceeded waiting for response to message {id}")]
    TtlExceeded { id: String, ttl: Duration },
    #[error("{context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("{0}")]
    Proxied(ProxyError),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<FuncieError>,
    },
}

impl FuncieError {
    /// Serialization failure with the field or message it concerns.
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        FuncieError::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Wrap this error with a description of the failed operation.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        FuncieError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a `Wrapped` chain.
    pub fn root(&self) -> &FuncieError {
        let mut current = self;
        while let FuncieError::Wrapped { source, .. } = current {
            current = source;
        }
        current
    }

    /// True when the caller should fall back to executing locally.
    pub fn is_no_consumer(&self) -> bool {
        match self.root() {
            FuncieError::NoActiveConsumer | FuncieError::ApplicationNotFound(_) => true,
            FuncieError::Proxied(p) => p.is_no_consumer(),
            _ => false,
        }
    }

    /// Map to the stable code carried by [`ProxyError`].
    pub fn code(&self) -> ErrorCode {
        match self.root() {
            FuncieError::NoActiveConsumer => ErrorCode::NoActiveConsumer,
            FuncieError::ApplicationNotFound(_) => ErrorCode::ApplicationNotFound,
            FuncieError::NoHandlerFound(_) => ErrorCode::NoHandlerFound,
            FuncieError::UnknownMessageKind(_) => ErrorCode::UnknownMessageKind,
            FuncieError::TtlExceeded { .. } => ErrorCode::TtlExceeded,
            FuncieError::Serialization { .. } => ErrorCode::BadPayload,
            FuncieError::Unsupported(_) => ErrorCode::Unsupported,
            FuncieError::Proxied(p) => p.code,
            _ => ErrorCode::Unknown,
        }
    }
}

/// Attach operation context to a fallible result.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.wrap(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.wrap(f()))
    }
}

/// An error that can be serialized across a wire boundary.
///
/// Only the message text and code survive the trip. A missing error is
/// represented by the absence of the field, never by an empty object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyError {
    pub message: String,
    #[serde(default)]
    pub code: ErrorCode,
}

impl ProxyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn from_error(err: &FuncieError) -> Self {
        match err {
            FuncieError::Proxied(p) => p.clone(),
            _ => Self::new(err.code(), err.to_string()),
        }
    }

    pub fn is_no_consumer(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NoActiveConsumer | ErrorCode::ApplicationNotFound
        )
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProxyError {}

impl From<ProxyError> for FuncieError {
    fn from(err: ProxyError) -> Self {
        FuncieError::Proxied(err)
    }
}
