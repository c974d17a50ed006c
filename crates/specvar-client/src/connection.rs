//! Connection contract consumed by variable watchers.
//!
//! A [`Connection`] owns the transport to one Spec server together with its
//! connection state and channel registry. Watchers never own a connection
//! exclusively; several watchers may share one through an `Arc`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use specvar_proto::{ChannelName, DispatchMode, EventKind, Value};

use crate::error::Error;

/// Handler for connection lifecycle events.
///
/// Returns `false` once it has nothing left to notify; the connection then
/// drops it.
pub type LifecycleHandler = Arc<dyn Fn() -> bool + Send + Sync>;

/// Handler for channel updates.
pub type UpdateHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; the connection may still come up.
    Disconnected,
    /// Connected to the server.
    Connected,
    /// Connection closed and will not come back.
    Closed,
}

impl ConnectionState {
    /// Check if this state accepts requests.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Identifier of a channel registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Create a registration ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A connection to a Spec server.
///
/// Channel registrations are not expected to survive a disconnect. Handlers
/// may call back into the connection (for example to register a channel
/// from a `connected` handler), so implementations must not hold internal
/// locks while invoking them.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Address this connection was opened for.
    fn address(&self) -> &str;

    /// Wait until the connection reaches the connected state.
    ///
    /// There is no timeout at this layer. Fails only if the connection can
    /// never become connected.
    async fn wait_connected(&self) -> Result<(), Error>;

    /// Check if the connection is currently connected.
    fn is_connected(&self) -> bool;

    /// Read the current value of a channel.
    async fn get(&self, channel: &ChannelName) -> Result<Value, Error>;

    /// Write a channel value and return the server acknowledgement.
    async fn set(&self, channel: &ChannelName, value: Value) -> Result<Value, Error>;

    /// Register a handler for a lifecycle event.
    ///
    /// Only [`EventKind::Connected`] and [`EventKind::Disconnected`] are
    /// lifecycle events. A handler stays installed until it returns `false`.
    fn connect_event(&self, kind: EventKind, handler: LifecycleHandler) -> Result<(), Error>;

    /// Subscribe a handler to updates of a channel.
    fn register_channel(
        &self,
        channel: &ChannelName,
        handler: UpdateHandler,
        mode: DispatchMode,
    ) -> RegistrationId;

    /// Remove a channel registration. Unknown IDs are ignored.
    fn unregister_channel(&self, id: RegistrationId);

    /// Run a refresh cycle, delivering any pending channel events.
    fn update(&self);
}

/// Opens connections for address targets.
pub trait Connector: Send + Sync {
    /// Open (or reuse) a connection to the given address.
    fn open(&self, address: &str) -> Result<Arc<dyn Connection>, Error>;
}

/// What a watcher binds to.
#[derive(Clone)]
pub enum Target {
    /// Server address; the watcher opens a connection through its connector.
    Address(String),
    /// An existing connection, shared with its other users.
    Connection(Arc<dyn Connection>),
}

impl Target {
    /// Check if the target names nothing to connect to.
    pub fn is_empty(&self) -> bool {
        match self {
            Target::Address(address) => address.is_empty(),
            Target::Connection(_) => false,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Address(address) => f.debug_tuple("Address").field(address).finish(),
            Target::Connection(conn) => f.debug_tuple("Connection").field(&conn.address()).finish(),
        }
    }
}

impl From<&str> for Target {
    fn from(address: &str) -> Self {
        Target::Address(address.to_string())
    }
}

impl From<String> for Target {
    fn from(address: String) -> Self {
        Target::Address(address)
    }
}

impl From<Arc<dyn Connection>> for Target {
    fn from(conn: Arc<dyn Connection>) -> Self {
        Target::Connection(conn)
    }
}

impl<C: Connection + 'static> From<Arc<C>> for Target {
    fn from(conn: Arc<C>) -> Self {
        Target::Connection(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Closed.is_connected());
    }

    #[test]
    fn test_target_from_address() {
        let target = Target::from("lid00a:fourc");
        assert!(matches!(&target, Target::Address(a) if a == "lid00a:fourc"));
        assert!(!target.is_empty());
        assert!(Target::from(String::new()).is_empty());
    }

    #[test]
    fn test_registration_id() {
        let id = RegistrationId::new(7);
        assert_eq!(id.get(), 7);
        assert!(RegistrationId::new(1) < id);
    }
}
