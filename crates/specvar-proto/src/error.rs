//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Channel or variable name cannot be used.
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    /// Server address is not of the form `host:port` or `host:specname`.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Unknown dispatch mode name.
    #[error("invalid dispatch mode: {0}")]
    InvalidDispatchMode(String),

    /// Unknown event kind name.
    #[error("invalid event kind: {0}")]
    InvalidEventKind(String),
}
