//! Dispatch modes and event kinds shared by watchers and connections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How channel updates are delivered to a registered handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchMode {
    /// Deliver the latest value only, and only when it differs from the last
    /// value delivered to the same handler.
    #[default]
    #[serde(rename = "UPDATEVALUE", alias = "updatevalue")]
    UpdateValue,
    /// Deliver every update event, including repeats of the same value.
    #[serde(rename = "FIREEVENT", alias = "fireevent")]
    FireEvent,
}

impl DispatchMode {
    /// Protocol spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::UpdateValue => "UPDATEVALUE",
            DispatchMode::FireEvent => "FIREEVENT",
        }
    }

    /// Check if repeated values are collapsed.
    pub fn coalesces(&self) -> bool {
        matches!(self, DispatchMode::UpdateValue)
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UPDATEVALUE" => Ok(DispatchMode::UpdateValue),
            "FIREEVENT" => Ok(DispatchMode::FireEvent),
            _ => Err(Error::InvalidDispatchMode(s.to_string())),
        }
    }
}

/// Kinds of events a watcher can be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The connection reached the connected state.
    Connected,
    /// The connection was lost.
    Disconnected,
    /// The watched channel delivered a value.
    Update,
}

impl EventKind {
    /// All recognized event kinds.
    pub const ALL: [EventKind; 3] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Update,
    ];

    /// Name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Update => "update",
        }
    }

    /// Check if this is a connection lifecycle event.
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, EventKind::Update)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidEventKind(s.to_string()))
    }
}
