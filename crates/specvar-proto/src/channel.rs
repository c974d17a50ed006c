//! Channel name resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Namespace under which plain variable names are published.
pub const VARIABLE_PREFIX: &str = "var/";

/// Separator between channel path components.
pub const PATH_SEPARATOR: char = '/';

/// Fully-qualified name of a channel on a Spec server.
///
/// A name that already contains a path separator is taken as-is; any other
/// name is placed under [`VARIABLE_PREFIX`]. Resolution depends only on the
/// input, so the same variable name always maps to the same channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Resolve a variable or channel name.
    pub fn resolve(name: impl AsRef<str>) -> Result<Self, Error> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(Error::InvalidChannel("name is empty".to_string()));
        }

        if name.contains(PATH_SEPARATOR) {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}{}", VARIABLE_PREFIX, name)))
        }
    }

    /// Get the full channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the variable name for channels under [`VARIABLE_PREFIX`].
    pub fn variable(&self) -> Option<&str> {
        self.0.strip_prefix(VARIABLE_PREFIX)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::resolve(name)
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::resolve(name)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_prefixed() {
        for name in ["motor", "A", "counter_1", "x.y"] {
            let chan = ChannelName::resolve(name).unwrap();
            assert_eq!(chan.as_str(), format!("var/{}", name));
            assert_eq!(chan.variable(), Some(name));
        }
    }

    #[test]
    fn test_path_name_is_identity() {
        for name in ["status/ready", "motor/tth/position", "var/already", "/"] {
            let chan = ChannelName::resolve(name).unwrap();
            assert_eq!(chan.as_str(), name);
        }
        assert_eq!(ChannelName::resolve("status/ready").unwrap().variable(), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = ChannelName::resolve("energy").unwrap();
        let b = ChannelName::resolve("energy").unwrap();
        assert_eq!(a, b);
        // Resolving an already-resolved name does not prefix twice.
        assert_eq!(ChannelName::resolve(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            ChannelName::resolve(""),
            Err(Error::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_serde_resolves() {
        let chan: ChannelName = serde_json::from_str(r#""motor""#).unwrap();
        assert_eq!(chan.as_str(), "var/motor");
        assert_eq!(serde_json::to_string(&chan).unwrap(), r#""var/motor""#);
    }
}
