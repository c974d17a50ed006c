//! In-process connections.
//!
//! [`MemoryConnection`] keeps channel values, registrations and lifecycle
//! handlers in memory and plays the part of both the transport and the
//! remote server. It is used to run watchers without a Spec server, and its
//! test controls (`connect`, `disconnect`, `publish`) drive the same code
//! paths a network connection would.
//!
//! ## Dispatch
//!
//! ```text
//! publish()/set() → queue → dispatch_pending() → handlers
//!                            ↑
//!                 auto-dispatch or update()
//! ```
//!
//! A drain delivers every queued event to `FIREEVENT` registrations. An
//! `UPDATEVALUE` registration gets the latest value of its channel in the
//! drained batch, and only if it differs from the value it last received.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;

use specvar_proto::{ChannelName, DispatchMode, EventKind, SpecAddress, Value};

use crate::connection::{
    Connection, ConnectionState, Connector, LifecycleHandler, RegistrationId, UpdateHandler,
};
use crate::error::Error;

/// A registered channel handler.
struct Registration {
    id: RegistrationId,
    channel: ChannelName,
    handler: UpdateHandler,
    mode: DispatchMode,
    /// Last value delivered, for `UPDATEVALUE` deduplication.
    last: Option<Value>,
}

/// An in-memory connection.
pub struct MemoryConnection {
    address: String,
    state: watch::Sender<ConnectionState>,
    values: DashMap<ChannelName, Value>,
    registrations: Mutex<Vec<Registration>>,
    lifecycle: Mutex<Vec<(EventKind, LifecycleHandler)>>,
    queue: Mutex<VecDeque<(ChannelName, Value)>>,
    /// Serializes deliveries across threads; re-entrant so handlers can publish.
    dispatch: ReentrantMutex<()>,
    auto_dispatch: AtomicBool,
    next_registration: AtomicU64,
}

impl MemoryConnection {
    /// Create a disconnected connection.
    pub fn new(address: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            address: address.into(),
            state,
            values: DashMap::new(),
            registrations: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            dispatch: ReentrantMutex::new(()),
            auto_dispatch: AtomicBool::new(true),
            next_registration: AtomicU64::new(1),
        }
    }

    /// Create a connection that is already connected.
    pub fn connected(address: impl Into<String>) -> Self {
        let conn = Self::new(address);
        conn.state.send_replace(ConnectionState::Connected);
        conn
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Bring the connection up and fire `connected` handlers.
    ///
    /// Does nothing if already connected or closed.
    pub fn connect(&self) {
        if !self.transition(ConnectionState::Connected) {
            return;
        }
        tracing::debug!(address = %self.address, "connection established");
        self.fire(EventKind::Connected);
    }

    /// Drop the connection and fire `disconnected` handlers.
    ///
    /// All channel registrations and undelivered events are discarded.
    pub fn disconnect(&self) {
        if !self.transition(ConnectionState::Disconnected) {
            return;
        }
        self.drop_registrations();
        tracing::debug!(address = %self.address, "connection lost");
        self.fire(EventKind::Disconnected);
    }

    /// Close the connection for good.
    ///
    /// Pending and future `wait_connected` calls fail with [`Error::Closed`].
    pub fn close(&self) {
        let was_connected = self.state().is_connected();
        if !self.transition(ConnectionState::Closed) {
            return;
        }
        self.drop_registrations();
        tracing::debug!(address = %self.address, "connection closed");
        if was_connected {
            self.fire(EventKind::Disconnected);
        }
    }

    /// Publish a value on a channel, as the server would.
    ///
    /// The value is stored; while connected an update event is queued and,
    /// with auto-dispatch on, delivered before this returns.
    pub fn publish(&self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let channel = ChannelName::resolve(name)?;
        self.publish_channel(&channel, value.into());
        Ok(())
    }

    /// Choose whether published events are delivered immediately or held
    /// until [`Connection::update`] is called.
    pub fn set_auto_dispatch(&self, enabled: bool) {
        self.auto_dispatch.store(enabled, Ordering::SeqCst);
    }

    /// Number of queued, undelivered events.
    pub fn pending_events(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of registrations for a channel.
    pub fn registration_count(&self, channel: &ChannelName) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|reg| reg.channel == *channel)
            .count()
    }

    /// Number of installed lifecycle handlers.
    pub fn lifecycle_handler_count(&self) -> usize {
        self.lifecycle.lock().len()
    }

    fn transition(&self, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == to || *state == ConnectionState::Closed {
                false
            } else {
                *state = to;
                true
            }
        })
    }

    fn drop_registrations(&self) {
        // Handlers are dropped outside the lock.
        let dropped = std::mem::take(&mut *self.registrations.lock());
        self.queue.lock().clear();
        drop(dropped);
    }

    fn fire(&self, kind: EventKind) {
        let handlers: Vec<LifecycleHandler> = self
            .lifecycle
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let expired: Vec<LifecycleHandler> = handlers
            .into_iter()
            .filter(|handler| !handler())
            .collect();
        if expired.is_empty() {
            return;
        }

        self.lifecycle
            .lock()
            .retain(|(_, handler)| !expired.iter().any(|dead| Arc::ptr_eq(dead, handler)));
        tracing::trace!(
            address = %self.address,
            event = %kind,
            expired = expired.len(),
            "dropped expired lifecycle handlers"
        );
    }

    fn publish_channel(&self, channel: &ChannelName, value: Value) {
        self.values.insert(channel.clone(), value.clone());

        if !self.is_connected() {
            return;
        }
        self.queue.lock().push_back((channel.clone(), value));

        if self.auto_dispatch.load(Ordering::SeqCst) {
            self.dispatch_pending();
        }
    }

    /// Drain the queue and deliver it to the registered handlers.
    fn dispatch_pending(&self) {
        let _guard = self.dispatch.lock();

        let events: Vec<(ChannelName, Value)> = self.queue.lock().drain(..).collect();
        if events.is_empty() {
            return;
        }

        let mut latest: HashMap<&ChannelName, usize> = HashMap::new();
        for (index, (channel, _)) in events.iter().enumerate() {
            latest.insert(channel, index);
        }

        let deliveries: Vec<(UpdateHandler, Value)> = {
            let mut registrations = self.registrations.lock();
            let mut deliveries = Vec::new();

            for (index, (channel, value)) in events.iter().enumerate() {
                for reg in registrations.iter_mut().filter(|r| r.channel == *channel) {
                    match reg.mode {
                        DispatchMode::FireEvent => {
                            deliveries.push((Arc::clone(&reg.handler), value.clone()));
                        }
                        DispatchMode::UpdateValue => {
                            if latest.get(channel) != Some(&index)
                                || reg.last.as_ref().is_some_and(|last| last.is_identical(value))
                            {
                                continue;
                            }
                            reg.last = Some(value.clone());
                            deliveries.push((Arc::clone(&reg.handler), value.clone()));
                        }
                    }
                }
            }
            deliveries
        };

        tracing::trace!(
            address = %self.address,
            events = events.len(),
            deliveries = deliveries.len(),
            "dispatched channel events"
        );

        for (handler, value) in deliveries {
            handler(&value);
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn wait_connected(&self) -> Result<(), Error> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != ConnectionState::Disconnected)
            .await
            .map_err(|_| Error::Closed)?;

        if state.is_connected() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    async fn get(&self, channel: &ChannelName) -> Result<Value, Error> {
        if !self.is_connected() {
            return Err(Error::Connection(format!("{} is not connected", self.address)));
        }
        Ok(self
            .values
            .get(channel)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn set(&self, channel: &ChannelName, value: Value) -> Result<Value, Error> {
        if !self.is_connected() {
            return Err(Error::Connection(format!("{} is not connected", self.address)));
        }
        self.publish_channel(channel, value.clone());
        Ok(value)
    }

    fn connect_event(&self, kind: EventKind, handler: LifecycleHandler) -> Result<(), Error> {
        if !kind.is_lifecycle() {
            return Err(Error::UnsupportedEvent(kind));
        }
        self.lifecycle.lock().push((kind, handler));
        Ok(())
    }

    fn register_channel(
        &self,
        channel: &ChannelName,
        handler: UpdateHandler,
        mode: DispatchMode,
    ) -> RegistrationId {
        let id = RegistrationId::new(self.next_registration.fetch_add(1, Ordering::SeqCst));
        self.registrations.lock().push(Registration {
            id,
            channel: channel.clone(),
            handler,
            mode,
            last: None,
        });

        tracing::debug!(
            address = %self.address,
            channel = %channel,
            registration = id.get(),
            mode = %mode,
            "channel registered"
        );
        id
    }

    fn unregister_channel(&self, id: RegistrationId) {
        let removed = {
            let mut registrations = self.registrations.lock();
            registrations
                .iter()
                .position(|reg| reg.id == id)
                .map(|index| registrations.remove(index))
        };
        drop(removed);
    }

    fn update(&self) {
        self.dispatch_pending();
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("channels", &self.values.len())
            .field("registrations", &self.registrations.lock().len())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

/// Opens one shared [`MemoryConnection`] per address.
#[derive(Debug)]
pub struct MemoryConnector {
    connections: DashMap<String, Arc<MemoryConnection>>,
    start_connected: bool,
}

impl MemoryConnector {
    /// Create a connector whose connections start connected.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            start_connected: true,
        }
    }

    /// Make new connections start disconnected.
    pub fn starting_disconnected(mut self) -> Self {
        self.start_connected = false;
        self
    }

    /// Get the connection opened for an address, if any.
    pub fn connection(&self, address: &str) -> Option<Arc<MemoryConnection>> {
        let key = address.parse::<SpecAddress>().ok()?.to_string();
        self.connections.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of distinct connections opened.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, address: &str) -> Result<Arc<dyn Connection>, Error> {
        let key = address.parse::<SpecAddress>()?.to_string();
        let conn = self
            .connections
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(address = %key, "opening in-memory connection");
                if self.start_connected {
                    Arc::new(MemoryConnection::connected(key.clone()))
                } else {
                    Arc::new(MemoryConnection::new(key.clone()))
                }
            })
            .clone();
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (UpdateHandler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: UpdateHandler = Arc::new(move |value: &Value| sink.lock().push(value.clone()));
        (handler, seen)
    }

    fn channel(name: &str) -> ChannelName {
        ChannelName::resolve(name).unwrap()
    }

    #[test]
    fn test_update_value_collapses_repeats() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        conn.register_channel(&channel("motor"), handler, DispatchMode::UpdateValue);

        for v in [3, 7, 7, 9] {
            conn.publish("motor", v).unwrap();
        }

        assert_eq!(*seen.lock(), vec![Value::Int(3), Value::Int(7), Value::Int(9)]);
    }

    #[test]
    fn test_fire_event_delivers_every_event() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        conn.register_channel(&channel("motor"), handler, DispatchMode::FireEvent);

        for v in [3, 7, 7, 9] {
            conn.publish("motor", v).unwrap();
        }

        assert_eq!(
            *seen.lock(),
            vec![Value::Int(3), Value::Int(7), Value::Int(7), Value::Int(9)]
        );
    }

    #[test]
    fn test_queued_events_coalesce_on_update() {
        let conn = MemoryConnection::connected("localhost:spec");
        conn.set_auto_dispatch(false);
        let (latest, latest_seen) = recorder();
        let (every, every_seen) = recorder();
        conn.register_channel(&channel("motor"), latest, DispatchMode::UpdateValue);
        conn.register_channel(&channel("motor"), every, DispatchMode::FireEvent);

        for v in [3, 7, 7, 9] {
            conn.publish("motor", v).unwrap();
        }
        assert_eq!(conn.pending_events(), 4);
        assert!(latest_seen.lock().is_empty());

        conn.update();

        assert_eq!(conn.pending_events(), 0);
        assert_eq!(*latest_seen.lock(), vec![Value::Int(9)]);
        assert_eq!(every_seen.lock().len(), 4);
    }

    #[test]
    fn test_other_channels_not_delivered() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        conn.register_channel(&channel("motor"), handler, DispatchMode::FireEvent);

        conn.publish("energy", 12.4).unwrap();
        conn.publish("status/ready", true).unwrap();

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        let id = conn.register_channel(&channel("motor"), handler, DispatchMode::FireEvent);

        conn.publish("motor", 1).unwrap();
        conn.unregister_channel(id);
        conn.publish("motor", 2).unwrap();

        assert_eq!(*seen.lock(), vec![Value::Int(1)]);
        assert_eq!(conn.registration_count(&channel("motor")), 0);
    }

    #[test]
    fn test_disconnect_drops_registrations() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        conn.register_channel(&channel("motor"), handler, DispatchMode::FireEvent);

        conn.disconnect();
        assert_eq!(conn.registration_count(&channel("motor")), 0);

        conn.publish("motor", 5).unwrap();
        conn.connect();
        conn.publish("motor", 6).unwrap();

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_lifecycle_handlers() {
        let conn = MemoryConnection::new("localhost:spec");
        let connected = Arc::new(AtomicUsize::new(0));
        let disconnected = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&connected);
        conn.connect_event(
            EventKind::Connected,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                true
            }),
        )
        .unwrap();
        let d = Arc::clone(&disconnected);
        conn.connect_event(
            EventKind::Disconnected,
            Arc::new(move || {
                d.fetch_add(1, Ordering::SeqCst);
                true
            }),
        )
        .unwrap();

        conn.connect();
        conn.connect(); // already connected
        conn.disconnect();
        conn.disconnect(); // already disconnected
        conn.connect();
        conn.close();
        conn.connect(); // closed for good

        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert_eq!(disconnected.load(Ordering::SeqCst), 2);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_expired_lifecycle_handlers_are_dropped() {
        let conn = MemoryConnection::connected("localhost:spec");
        let calls = Arc::new(AtomicUsize::new(0));

        for live in [true, false, false] {
            let c = Arc::clone(&calls);
            conn.connect_event(
                EventKind::Disconnected,
                Arc::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    live
                }),
            )
            .unwrap();
        }
        conn.connect_event(EventKind::Connected, Arc::new(|| false)).unwrap();
        assert_eq!(conn.lifecycle_handler_count(), 4);

        conn.disconnect();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(conn.lifecycle_handler_count(), 2);

        conn.connect();
        conn.disconnect();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(conn.lifecycle_handler_count(), 1);
    }

    #[test]
    fn test_update_value_collapses_repeated_nan() {
        let conn = MemoryConnection::connected("localhost:spec");
        let (handler, seen) = recorder();
        conn.register_channel(&channel("motor"), handler, DispatchMode::UpdateValue);

        conn.publish("motor", f64::NAN).unwrap();
        conn.publish("motor", f64::NAN).unwrap();
        conn.publish("motor", 1.0).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].as_f64().is_some_and(f64::is_nan));
        assert_eq!(seen[1], Value::Float(1.0));
    }

    #[test]
    fn test_update_is_not_a_lifecycle_event() {
        let conn = MemoryConnection::new("localhost:spec");
        let result = conn.connect_event(EventKind::Update, Arc::new(|| true));
        assert!(matches!(result, Err(Error::UnsupportedEvent(EventKind::Update))));
    }

    #[test]
    fn test_handler_can_register_from_connected_event() {
        let conn = Arc::new(MemoryConnection::new("localhost:spec"));
        let (handler, seen) = recorder();

        let weak = Arc::downgrade(&conn);
        conn.connect_event(
            EventKind::Connected,
            Arc::new(move || match weak.upgrade() {
                Some(conn) => {
                    conn.register_channel(
                        &channel("motor"),
                        Arc::clone(&handler),
                        DispatchMode::FireEvent,
                    );
                    true
                }
                None => false,
            }),
        )
        .unwrap();

        conn.connect();
        conn.publish("motor", 42).unwrap();

        assert_eq!(*seen.lock(), vec![Value::Int(42)]);
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let conn = MemoryConnection::connected("localhost:spec");
        let motor = channel("motor");

        assert_eq!(conn.get(&motor).await.unwrap(), Value::Null);
        let ack = conn.set(&motor, Value::Float(1.25)).await.unwrap();
        assert_eq!(ack, Value::Float(1.25));
        assert_eq!(conn.get(&motor).await.unwrap(), Value::Float(1.25));

        conn.disconnect();
        assert!(matches!(conn.get(&motor).await, Err(Error::Connection(_))));
        assert!(matches!(
            conn.set(&motor, Value::Int(0)).await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_connected() {
        let conn = Arc::new(MemoryConnection::new("localhost:spec"));

        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.wait_connected().await })
        };
        tokio::task::yield_now().await;
        conn.connect();

        assert!(waiter.await.unwrap().is_ok());
        assert!(conn.wait_connected().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_connected_fails_when_closed() {
        let conn = Arc::new(MemoryConnection::new("localhost:spec"));

        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.wait_connected().await })
        };
        tokio::task::yield_now().await;
        conn.close();

        assert!(matches!(waiter.await.unwrap(), Err(Error::Closed)));
    }

    #[test]
    fn test_connector_shares_connections() {
        let connector = MemoryConnector::new();

        let a = connector.open("lid00a:fourc").unwrap();
        let b = connector.open(" lid00a:fourc ").unwrap();
        let c = connector.open("lid00a:6510").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(connector.connection_count(), 2);
        assert!(a.is_connected());
        assert!(connector.connection("lid00a:fourc").is_some());
    }

    #[test]
    fn test_connector_rejects_bad_address() {
        let connector = MemoryConnector::new();
        assert!(matches!(
            connector.open("nowhere"),
            Err(Error::Protocol(specvar_proto::Error::InvalidAddress { .. }))
        ));
    }

    #[test]
    fn test_connector_starting_disconnected() {
        let connector = MemoryConnector::new().starting_disconnected();
        let conn = connector.open("localhost:spec").unwrap();
        assert!(!conn.is_connected());
    }
}
