//! Applications and the network endpoints they listen on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FuncieError, Result};

/// Network address of a locally running application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse `scheme://host:port`.
    pub fn parse(address: &str) -> Result<Self> {
        let (protocol, rest) = address
            .split_once("://")
            .ok_or_else(|| FuncieError::Config(format!("endpoint {address:?} has no scheme")))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| FuncieError::Config(format!("endpoint {address:?} has no port")))?;
        if protocol.is_empty() || host.is_empty() {
            return Err(FuncieError::Config(format!(
                "endpoint {address:?} is incomplete"
            )));
        }
        let port = port.trim_end_matches('/').parse::<u16>().map_err(|e| {
            FuncieError::Config(format!("endpoint {address:?} has invalid port: {e}"))
        })?;
        Ok(Self::new(protocol, host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// A named application reachable at an endpoint.
///
/// Registries own the mapping; an application is replaced by registering
/// it again, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub endpoint: Endpoint,
}

impl Application {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parse_and_display() {
        let ep = Endpoint::parse("http://localhost:8080").unwrap();
        assert_eq!(ep, Endpoint::new("http", "localhost", 8080));
        assert_eq!(ep.to_string(), "http://localhost:8080");
    }

    #[test]
    fn parse_rejects_bad_addresses() {
        assert!(Endpoint::parse("localhost:8080").is_err());
        assert!(Endpoint::parse("http://localhost").is_err());
        assert!(Endpoint::parse("http://localhost:eighty").is_err());
        assert!(Endpoint::parse("http://:80").is_err());
    }

    #[test]
    fn endpoint_wire_shape() {
        let json = serde_json::to_string(&Endpoint::new("https", "h", 443)).unwrap();
        assert_eq!(json, r#"{"protocol":"https","host":"h","port":443}"#);
    }
}
