//! Watcher configuration.

use serde::Deserialize;

use specvar_proto::{ChannelName, DispatchMode, SpecAddress};

use crate::error::Error;

/// Default Spec server address.
pub const DEFAULT_ADDRESS: &str = "localhost:spec";

/// Default dispatch mode for asynchronous watchers.
pub const DEFAULT_DISPATCH_MODE: DispatchMode = DispatchMode::UpdateValue;

/// Configuration for a variable watcher.
///
/// Deserializes from a map such as `{"variable": "tth", "address":
/// "lid00a:fourc", "dispatch_mode": "FIREEVENT"}`; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Variable or channel name (e.g., "tth" or "status/ready").
    pub variable: String,

    /// Spec server address (e.g., "lid00a:6510" or "localhost:fourc").
    pub address: String,

    /// How channel updates are delivered.
    pub dispatch_mode: DispatchMode,
}

impl WatcherConfig {
    /// Create a configuration for a variable on the default server.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            address: DEFAULT_ADDRESS.to_string(),
            dispatch_mode: DEFAULT_DISPATCH_MODE,
        }
    }

    /// Set the server address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the dispatch mode.
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Resolve the channel this configuration watches.
    pub fn channel_name(&self) -> Result<ChannelName, Error> {
        Ok(ChannelName::resolve(&self.variable)?)
    }

    /// Check the variable name and server address.
    pub fn validate(&self) -> Result<(), Error> {
        if self.variable.is_empty() {
            return Err(Error::Config("variable name is required".to_string()));
        }
        self.address.parse::<SpecAddress>()?;
        Ok(())
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new("")
    }
}
