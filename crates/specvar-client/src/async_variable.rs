//! Asynchronous variable watcher.
//!
//! An [`AsyncVariableWatcher`] is a [`VariableWatcher`] that also listens to
//! its connection. Each time the connection comes up it subscribes the
//! channel again, since registrations do not survive a disconnect. Events
//! reach the user through the [`CallbackSet`] first and the
//! [`VariableHooks`] second.
//!
//! Handlers installed on the connection only hold weak references to the
//! watcher and its connection. Binding again or dropping the watcher removes
//! its channel registration and retires the handlers of the earlier bind.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use specvar_proto::{ChannelName, DispatchMode, EventKind, Value};

use crate::callback::{invoke_isolated, CallbackSet, NoHooks, VariableHooks};
use crate::config::WatcherConfig;
use crate::connection::{Connection, Connector, RegistrationId, Target, UpdateHandler};
use crate::error::Error;
use crate::variable::{Binding, VariableWatcher};

/// State shared with the handlers registered on the connection.
struct Shared<H> {
    dispatch_mode: DispatchMode,
    callbacks: CallbackSet,
    hooks: H,
    subscription: Mutex<Subscription>,
}

/// Channel registration of the current bind.
#[derive(Default)]
struct Subscription {
    /// Bumped on every bind; handlers of older binds go quiet.
    generation: u64,
    registration: Option<(Weak<dyn Connection>, RegistrationId)>,
}

/// Watches a Spec variable and reacts to pushed updates.
///
/// # Example
///
/// ```ignore
/// use specvar_client::{AsyncVariableWatcher, CallbackResult, CallbackSet, DispatchMode, Value};
///
/// let on_update = Arc::new(|value: &Value| -> CallbackResult {
///     println!("motor at {}", value);
///     Ok(())
/// });
/// let motor = AsyncVariableWatcher::new(
///     "motor",
///     conn,
///     DispatchMode::UpdateValue,
///     CallbackSet::new().on_update(&on_update),
/// )
/// .await?;
/// ```
pub struct AsyncVariableWatcher<H: VariableHooks = NoHooks> {
    base: VariableWatcher,
    shared: Arc<Shared<H>>,
}

impl AsyncVariableWatcher<NoHooks> {
    /// Create a watcher with callbacks and bind it.
    ///
    /// An empty name or empty address leaves the watcher unbound.
    pub async fn new(
        name: &str,
        target: impl Into<Target>,
        dispatch_mode: DispatchMode,
        callbacks: CallbackSet,
    ) -> Result<Self, Error> {
        Self::with_hooks(name, target, dispatch_mode, callbacks, NoHooks).await
    }

    /// Create an unbound watcher with callbacks.
    pub fn unbound(dispatch_mode: DispatchMode, callbacks: CallbackSet) -> Self {
        Self::unbound_with_hooks(dispatch_mode, callbacks, NoHooks)
    }
}

impl<H: VariableHooks> AsyncVariableWatcher<H> {
    /// Create a watcher with callbacks and hooks and bind it.
    ///
    /// An empty name or empty address leaves the watcher unbound.
    pub async fn with_hooks(
        name: &str,
        target: impl Into<Target>,
        dispatch_mode: DispatchMode,
        callbacks: CallbackSet,
        hooks: H,
    ) -> Result<Self, Error> {
        let mut watcher = Self::unbound_with_hooks(dispatch_mode, callbacks, hooks);
        if let Some(binding) = watcher.base.bind_if_given(name, target.into()).await? {
            watcher.attach(&binding)?;
        }
        Ok(watcher)
    }

    /// Create an unbound watcher with callbacks and hooks.
    pub fn unbound_with_hooks(dispatch_mode: DispatchMode, callbacks: CallbackSet, hooks: H) -> Self {
        Self {
            base: VariableWatcher::unbound(),
            shared: Arc::new(Shared {
                dispatch_mode,
                callbacks,
                hooks,
                subscription: Mutex::new(Subscription::default()),
            }),
        }
    }

    /// Create a watcher from configuration, opening its address with
    /// `connector`.
    pub async fn from_config(
        config: &WatcherConfig,
        connector: Arc<dyn Connector>,
        callbacks: CallbackSet,
        hooks: H,
    ) -> Result<Self, Error> {
        config.validate()?;

        let mut watcher = Self::unbound_with_hooks(config.dispatch_mode, callbacks, hooks)
            .with_connector(connector);
        watcher.bind(&config.variable, config.address.as_str()).await?;
        Ok(watcher)
    }

    /// Open address targets with `connector`.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.base.set_connector(connector);
        self
    }

    /// Bind the watcher to a variable and subscribe to its updates.
    pub async fn bind(&mut self, name: &str, target: impl Into<Target>) -> Result<(), Error> {
        let binding = self.base.bind_target(name, target.into()).await?;
        self.attach(&binding)
    }

    /// Retire the previous bind, install lifecycle handlers, and run the
    /// connected path right away if the connection is already up.
    fn attach(&self, binding: &Binding) -> Result<(), Error> {
        let conn = &binding.conn;
        let generation = self.shared.next_generation();

        let connected = LifecycleTarget::new(&self.shared, generation, binding);
        conn.connect_event(
            EventKind::Connected,
            Arc::new(move || connected.run(Shared::<H>::handle_connected)),
        )?;

        let disconnected = LifecycleTarget::new(&self.shared, generation, binding);
        conn.connect_event(
            EventKind::Disconnected,
            Arc::new(move || disconnected.run(Shared::<H>::handle_disconnected)),
        )?;

        if conn.is_connected() {
            self.shared.handle_connected(&binding.channel, conn);
        }
        Ok(())
    }

    /// Ask the connection to deliver pending channel events.
    pub fn refresh(&self) {
        if let Some(conn) = self.base.connection() {
            conn.update();
        }
    }

    /// Get the dispatch mode.
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.shared.dispatch_mode
    }

    /// Get the hooks.
    pub fn hooks(&self) -> &H {
        &self.shared.hooks
    }

    /// Get the underlying watcher.
    pub fn watcher(&self) -> &VariableWatcher {
        &self.base
    }

    /// See [`VariableWatcher::is_connected`].
    pub fn is_connected(&self) -> bool {
        self.base.is_connected()
    }

    /// See [`VariableWatcher::channel_name`].
    pub fn channel_name(&self) -> Option<&ChannelName> {
        self.base.channel_name()
    }

    /// See [`VariableWatcher::get_value`].
    pub async fn get_value(&self) -> Result<Option<Value>, Error> {
        self.base.get_value().await
    }

    /// See [`VariableWatcher::set_value`].
    pub async fn set_value(&self, value: Value) -> Result<Option<Value>, Error> {
        self.base.set_value(value).await
    }

    /// See [`VariableWatcher::wait_update`].
    pub async fn wait_update(
        &self,
        expected: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, Error> {
        self.base.wait_update(expected, timeout).await
    }
}

impl<H> Shared<H> {
    /// Start a new bind and drop the registration of the previous one.
    fn next_generation(&self) -> u64 {
        let (generation, previous) = {
            let mut subscription = self.subscription.lock();
            subscription.generation += 1;
            (subscription.generation, subscription.registration.take())
        };
        unregister(previous);
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.subscription.lock().generation == generation
    }

    fn release(&self) {
        let previous = self.subscription.lock().registration.take();
        unregister(previous);
    }
}

fn unregister(registration: Option<(Weak<dyn Connection>, RegistrationId)>) {
    if let Some((conn, id)) = registration {
        if let Some(conn) = conn.upgrade() {
            conn.unregister_channel(id);
        }
    }
}

impl<H: VariableHooks> Shared<H> {
    fn handle_connected(self: &Arc<Self>, channel: &ChannelName, conn: &Arc<dyn Connection>) {
        let generation = self.subscription.lock().generation;
        let weak = Arc::downgrade(self);
        let update_channel = channel.clone();
        let handler: UpdateHandler = Arc::new(move |value: &Value| {
            if let Some(shared) = weak.upgrade() {
                if shared.is_current(generation) {
                    shared.handle_update(&update_channel, value);
                }
            }
        });
        let id = conn.register_channel(channel, handler, self.dispatch_mode);

        let previous = self
            .subscription
            .lock()
            .registration
            .replace((Arc::downgrade(conn), id));
        unregister(previous);

        tracing::debug!(
            channel = %channel,
            address = %conn.address(),
            mode = %self.dispatch_mode,
            "variable subscribed"
        );

        if let Some(callback) = self.callbacks.connected() {
            invoke_isolated(EventKind::Connected, channel, || callback());
        }
        self.hooks.connected();
    }

    fn handle_disconnected(self: &Arc<Self>, channel: &ChannelName, conn: &Arc<dyn Connection>) {
        tracing::debug!(channel = %channel, address = %conn.address(), "variable disconnected");

        if let Some(callback) = self.callbacks.disconnected() {
            invoke_isolated(EventKind::Disconnected, channel, || callback());
        }
        self.hooks.disconnected();
    }

    fn handle_update(&self, channel: &ChannelName, value: &Value) {
        tracing::trace!(channel = %channel, value = %value, "variable updated");

        if let Some(callback) = self.callbacks.update() {
            invoke_isolated(EventKind::Update, channel, || callback(value));
        }
        self.hooks.update(value);
    }
}

/// What a lifecycle handler needs, held weakly.
struct LifecycleTarget<H> {
    shared: Weak<Shared<H>>,
    generation: u64,
    channel: ChannelName,
    conn: Weak<dyn Connection>,
}

impl<H: VariableHooks> LifecycleTarget<H> {
    fn new(shared: &Arc<Shared<H>>, generation: u64, binding: &Binding) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            generation,
            channel: binding.channel.clone(),
            conn: Arc::downgrade(&binding.conn),
        }
    }

    /// Returns `false` once the watcher is gone or has been bound again.
    fn run(&self, handle: fn(&Arc<Shared<H>>, &ChannelName, &Arc<dyn Connection>)) -> bool {
        let (Some(shared), Some(conn)) = (self.shared.upgrade(), self.conn.upgrade()) else {
            return false;
        };
        if !shared.is_current(self.generation) {
            return false;
        }
        handle(&shared, &self.channel, &conn);
        true
    }
}

impl<H: VariableHooks> Drop for AsyncVariableWatcher<H> {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl<H: VariableHooks> fmt::Debug for AsyncVariableWatcher<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncVariableWatcher")
            .field("watcher", &self.base)
            .field("dispatch_mode", &self.shared.dispatch_mode)
            .field("callbacks", &self.shared.callbacks)
            .finish()
    }
}
