//! Client error types.

use thiserror::Error;

use specvar_proto::EventKind;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Connection was closed and will not reconnect.
    #[error("connection closed")]
    Closed,

    /// Wait timed out.
    #[error("timed out waiting for channel update")]
    Timeout,

    /// An address target was given but no connector is configured.
    #[error("no connector configured to open address targets")]
    NoConnector,

    /// The connection does not deliver this event kind as a lifecycle event.
    #[error("event kind '{0}' is not a connection lifecycle event")]
    UnsupportedEvent(EventKind),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] specvar_proto::Error),
}

impl Error {
    /// Check if this error is a wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
