//! Listen address parsing
//!
//! Accepts a URL prefix such as `http://127.0.0.1:8080/` or a bare
//! `host:port`. The scheme and any path are ignored. `+` and `*` mean all
//! interfaces.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const ANY_HOST: &str = "0.0.0.0";

/// Why a listen address could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenAddressError {
    /// Nothing to parse
    #[error("listen address is empty")]
    Empty,

    /// No `:port` after the host
    #[error("listen address {0:?} has no port")]
    MissingPort(String),

    /// The port is not a number in 0..=65535
    #[error("listen address {address:?} has an invalid port {port:?}")]
    InvalidPort {
        /// The address as given
        address: String,
        /// The port text that failed to parse
        port: String,
    },
}

/// Host and port to bind the HTTP listener to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    /// Host name or IP literal, without brackets
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port to bind
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Argument for `TcpListener::bind`
    #[must_use]
    pub fn socket_target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ListenAddress {
    type Err = ListenAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(ListenAddressError::Empty);
        }

        let missing_port = || ListenAddressError::MissingPort(trimmed.to_string());
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(missing_port)?;
            let port = after.strip_prefix(':').ok_or_else(missing_port)?;
            (host, port)
        } else {
            authority.rsplit_once(':').ok_or_else(missing_port)?
        };
        if port.is_empty() {
            return Err(missing_port());
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ListenAddressError::InvalidPort {
                address: trimmed.to_string(),
                port: port.to_string(),
            })?;

        let host = match host {
            "" | "+" | "*" => ANY_HOST,
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}
