//! Spec server addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Port part of a Spec server address.
///
/// Spec servers are reached either on a fixed TCP port or by the name of the
/// Spec session, which the client resolves by scanning the server port range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecPort {
    /// Explicit TCP port.
    Number(u16),
    /// Spec session name.
    Name(String),
}

impl fmt::Display for SpecPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecPort::Number(port) => write!(f, "{}", port),
            SpecPort::Name(name) => f.write_str(name),
        }
    }
}

/// Address of a Spec server in `host:port` or `host:specname` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecAddress {
    /// Host name or IP address.
    pub host: String,
    /// Port number or session name.
    pub port: SpecPort,
}

impl SpecAddress {
    /// Create an address for a host and session name or port.
    pub fn new(host: impl Into<String>, port: SpecPort) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Check if the address names a Spec session rather than a port.
    pub fn is_named(&self) -> bool {
        matches!(self.port, SpecPort::Name(_))
    }
}

impl fmt::Display for SpecAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for SpecAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected 'host:port' or 'host:specname'"))?;

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if port.is_empty() {
            return Err(invalid("port or session name is empty"));
        }

        let port = if port.bytes().all(|b| b.is_ascii_digit()) {
            SpecPort::Number(port.parse().map_err(|_| invalid("port out of range"))?)
        } else {
            SpecPort::Name(port.to_string())
        };

        Ok(Self::new(host, port))
    }
}
