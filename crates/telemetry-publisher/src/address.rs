//! Broker address parsing

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default MQTT port
pub const DEFAULT_PORT: u16 = 1883;

/// Errors while parsing a broker address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing host in {0:?}")]
    MissingHost(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// Host and port of an MQTT broker
///
/// Accepts `tcp://host:port`, `mqtt://host:port`, `host:port` or `host`
/// (port defaults to 1883).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = AddressError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let trimmed = uri.trim();
        let rest = match trimmed.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => return Err(AddressError::UnsupportedScheme(scheme.to_string())),
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|&p| p != 0)
                    .ok_or_else(|| AddressError::InvalidPort(port.to_string()))?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(AddressError::MissingHost(uri.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}
