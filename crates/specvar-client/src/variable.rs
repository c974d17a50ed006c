//! Variable watcher.
//!
//! A [`VariableWatcher`] binds one Spec variable to a connection and passes
//! reads and writes through to it. While the connection is down, reads
//! return `None`, writes are skipped and waits return immediately; callers
//! that need a guarantee check [`VariableWatcher::is_connected`] first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use specvar_proto::{ChannelName, Value};

use crate::connection::{Connection, Connector, Target};
use crate::error::Error;
use crate::wait::WaitObject;

/// A resolved channel on a connection.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) channel: ChannelName,
    pub(crate) conn: Arc<dyn Connection>,
}

/// Watches a single Spec variable.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use specvar_client::{MemoryConnection, VariableWatcher};
///
/// let conn = Arc::new(MemoryConnection::connected("localhost:spec"));
/// let motor = VariableWatcher::new("motor", conn).await?;
///
/// motor.set_value(12.5.into()).await?;
/// let next = motor.wait_update(None, Some(Duration::from_secs(5))).await?;
/// ```
#[derive(Default)]
pub struct VariableWatcher {
    binding: Option<Binding>,
    connector: Option<Arc<dyn Connector>>,
}

impl VariableWatcher {
    /// Create a watcher and bind it.
    ///
    /// An empty name or empty address leaves the watcher unbound.
    pub async fn new(name: &str, target: impl Into<Target>) -> Result<Self, Error> {
        let mut watcher = Self::unbound();
        watcher.bind_if_given(name, target.into()).await?;
        Ok(watcher)
    }

    /// Create an unbound watcher.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Create an unbound watcher that opens address targets with `connector`.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            binding: None,
            connector: Some(connector),
        }
    }

    /// Open address targets with `connector` on later binds.
    pub fn set_connector(&mut self, connector: Arc<dyn Connector>) {
        self.connector = Some(connector);
    }

    /// Bind the watcher to a variable.
    ///
    /// Resolves the channel name, opens or adopts the connection and waits
    /// until it is connected. There is no timeout on that wait; wrap the
    /// call in `tokio::time::timeout` to bound it.
    pub async fn bind(&mut self, name: &str, target: impl Into<Target>) -> Result<(), Error> {
        self.bind_target(name, target.into()).await.map(|_| ())
    }

    pub(crate) async fn bind_if_given(
        &mut self,
        name: &str,
        target: Target,
    ) -> Result<Option<Binding>, Error> {
        if name.is_empty() || target.is_empty() {
            return Ok(None);
        }
        self.bind_target(name, target).await.map(Some)
    }

    pub(crate) async fn bind_target(
        &mut self,
        name: &str,
        target: Target,
    ) -> Result<Binding, Error> {
        let channel = ChannelName::resolve(name)?;

        let conn = match target {
            Target::Address(address) => {
                let connector = self.connector.as_ref().ok_or(Error::NoConnector)?;
                connector.open(&address)?
            }
            Target::Connection(conn) => conn,
        };

        tracing::debug!(
            channel = %channel,
            address = %conn.address(),
            "binding variable watcher"
        );
        conn.wait_connected().await?;

        let binding = Binding { channel, conn };
        self.binding = Some(binding.clone());
        Ok(binding)
    }

    /// Check if the watcher is bound to a connected connection.
    pub fn is_connected(&self) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|binding| binding.conn.is_connected())
    }

    /// Get the resolved channel name, if bound.
    pub fn channel_name(&self) -> Option<&ChannelName> {
        self.binding.as_ref().map(|binding| &binding.channel)
    }

    /// Get the connection, if bound.
    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.binding.as_ref().map(|binding| &binding.conn)
    }

    /// Read the current value.
    ///
    /// Returns `Ok(None)` when not connected.
    pub async fn get_value(&self) -> Result<Option<Value>, Error> {
        match self.connected_binding() {
            Some(binding) => binding.conn.get(&binding.channel).await.map(Some),
            None => Ok(None),
        }
    }

    /// Write a new value and return the server acknowledgement.
    ///
    /// When not connected the write is skipped and `Ok(None)` is returned.
    pub async fn set_value(&self, value: Value) -> Result<Option<Value>, Error> {
        match self.connected_binding() {
            Some(binding) => binding.conn.set(&binding.channel, value).await.map(Some),
            None => {
                tracing::trace!(channel = ?self.channel_name(), "not connected, write skipped");
                Ok(None)
            }
        }
    }

    /// Wait for the variable to change.
    ///
    /// With `expected`, waits for that particular value. Returns
    /// [`Error::Timeout`] if `timeout` elapses first, and `Ok(None)` right
    /// away when not connected.
    pub async fn wait_update(
        &self,
        expected: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, Error> {
        let Some(binding) = self.connected_binding() else {
            return Ok(None);
        };

        let mut wait = WaitObject::new(Arc::clone(&binding.conn));
        wait.wait_channel_update(&binding.channel, expected, timeout)
            .await
    }

    fn connected_binding(&self) -> Option<&Binding> {
        self.binding
            .as_ref()
            .filter(|binding| binding.conn.is_connected())
    }
}

impl fmt::Debug for VariableWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableWatcher")
            .field("channel", &self.channel_name().map(ChannelName::as_str))
            .field("address", &self.connection().map(|conn| conn.address()))
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnection, MemoryConnector};

    fn connected() -> Arc<MemoryConnection> {
        Arc::new(MemoryConnection::connected("localhost:spec"))
    }

    #[tokio::test]
    async fn test_unbound_watcher() {
        let watcher = VariableWatcher::unbound();

        assert!(watcher.channel_name().is_none());
        assert!(watcher.connection().is_none());
        assert!(!watcher.is_connected());
        assert_eq!(watcher.get_value().await.unwrap(), None);
        assert_eq!(watcher.set_value(Value::Int(1)).await.unwrap(), None);
        assert_eq!(watcher.wait_update(None, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_name_or_target_leaves_unbound() {
        let watcher = VariableWatcher::new("", connected()).await.unwrap();
        assert!(watcher.channel_name().is_none());

        let watcher = VariableWatcher::new("motor", "").await.unwrap();
        assert!(watcher.channel_name().is_none());
    }

    #[tokio::test]
    async fn test_bind_to_shared_connection() {
        let conn = connected();
        let watcher = VariableWatcher::new("motor", Arc::clone(&conn)).await.unwrap();

        assert_eq!(watcher.channel_name().unwrap().as_str(), "var/motor");
        assert!(watcher.is_connected());
        assert_eq!(watcher.connection().unwrap().address(), "localhost:spec");
    }

    #[tokio::test]
    async fn test_bind_address_through_connector() {
        let connector = Arc::new(MemoryConnector::new());
        let mut watcher = VariableWatcher::with_connector(connector.clone());
        watcher.bind("status/ready", "lid00a:fourc").await.unwrap();

        assert_eq!(watcher.channel_name().unwrap().as_str(), "status/ready");
        assert!(watcher.is_connected());
        assert_eq!(connector.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_bind_address_without_connector() {
        let mut watcher = VariableWatcher::unbound();
        let result = watcher.bind("motor", "lid00a:fourc").await;

        assert!(matches!(result, Err(Error::NoConnector)));
        assert!(watcher.channel_name().is_none());
    }

    #[tokio::test]
    async fn test_bind_propagates_closed_connection() {
        let conn = Arc::new(MemoryConnection::new("localhost:spec"));
        conn.close();

        let result = VariableWatcher::new("motor", conn).await;
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let conn = connected();
        let watcher = VariableWatcher::new("motor", Arc::clone(&conn)).await.unwrap();

        assert_eq!(watcher.get_value().await.unwrap(), Some(Value::Null));
        let ack = watcher.set_value(Value::Float(3.5)).await.unwrap();
        assert_eq!(ack, Some(Value::Float(3.5)));
        assert_eq!(watcher.get_value().await.unwrap(), Some(Value::Float(3.5)));
    }

    #[tokio::test]
    async fn test_disconnected_get_set_are_noops() {
        let conn = connected();
        let watcher = VariableWatcher::new("motor", Arc::clone(&conn)).await.unwrap();
        watcher.set_value(Value::Int(1)).await.unwrap();

        conn.disconnect();

        assert!(!watcher.is_connected());
        assert_eq!(watcher.get_value().await.unwrap(), None);
        assert_eq!(watcher.set_value(Value::Int(2)).await.unwrap(), None);
        assert_eq!(watcher.wait_update(None, None).await.unwrap(), None);

        conn.connect();
        assert_eq!(watcher.get_value().await.unwrap(), Some(Value::Int(1)));
    }

    #[tokio::test]
    async fn test_debug_output() {
        let watcher = VariableWatcher::new("motor", connected()).await.unwrap();
        let debug = format!("{:?}", watcher);
        assert!(debug.contains("var/motor"));
        assert!(debug.contains("localhost:spec"));
    }
}
