//! User callbacks and overridable hooks for asynchronous watchers.
//!
//! Two independent extension points react to the same three events:
//!
//! - a [`CallbackSet`] of weakly held closures supplied at construction;
//! - a [`VariableHooks`] implementation carried by the watcher.
//!
//! For every event the callback runs first, then the hook. A callback that
//! returns an error or panics is logged and does not stop the hook.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use specvar_proto::{ChannelName, EventKind, Value};

/// Error returned by a user callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a user callback.
pub type CallbackResult = Result<(), CallbackError>;

/// Callback for `connected` and `disconnected` events.
pub type LifecycleCallback = dyn Fn() -> CallbackResult + Send + Sync;

/// Callback for `update` events.
pub type UpdateCallback = dyn Fn(&Value) -> CallbackResult + Send + Sync;

/// Callbacks keyed by event kind, held by weak reference.
///
/// Registering a callback does not keep it alive: the caller owns the `Arc`,
/// and once it is dropped the entry behaves exactly as if none was set.
#[derive(Clone, Default)]
pub struct CallbackSet {
    connected: Option<Weak<LifecycleCallback>>,
    disconnected: Option<Weak<LifecycleCallback>>,
    update: Option<Weak<UpdateCallback>>,
}

impl CallbackSet {
    /// Create an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `connected` callback.
    pub fn on_connected<F>(mut self, callback: &Arc<F>) -> Self
    where
        F: Fn() -> CallbackResult + Send + Sync + 'static,
    {
        let weak: Weak<F> = Arc::downgrade(callback);
        self.connected = Some(weak);
        self
    }

    /// Set the `disconnected` callback.
    pub fn on_disconnected<F>(mut self, callback: &Arc<F>) -> Self
    where
        F: Fn() -> CallbackResult + Send + Sync + 'static,
    {
        let weak: Weak<F> = Arc::downgrade(callback);
        self.disconnected = Some(weak);
        self
    }

    /// Set the `update` callback.
    pub fn on_update<F>(mut self, callback: &Arc<F>) -> Self
    where
        F: Fn(&Value) -> CallbackResult + Send + Sync + 'static,
    {
        let weak: Weak<F> = Arc::downgrade(callback);
        self.update = Some(weak);
        self
    }

    /// Check if a live callback is set for an event kind.
    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Connected => self.connected().is_some(),
            EventKind::Disconnected => self.disconnected().is_some(),
            EventKind::Update => self.update().is_some(),
        }
    }

    pub(crate) fn connected(&self) -> Option<Arc<LifecycleCallback>> {
        self.connected.as_ref()?.upgrade()
    }

    pub(crate) fn disconnected(&self) -> Option<Arc<LifecycleCallback>> {
        self.disconnected.as_ref()?.upgrade()
    }

    pub(crate) fn update(&self) -> Option<Arc<UpdateCallback>> {
        self.update.as_ref()?.upgrade()
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live: Vec<&str> = EventKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .map(|kind| kind.as_str())
            .collect();
        f.debug_struct("CallbackSet").field("live", &live).finish()
    }
}

/// Overridable reactions to watcher events.
///
/// All methods are no-ops by default. They run after the corresponding user
/// callback, whether or not that callback succeeded.
pub trait VariableHooks: Send + Sync + 'static {
    /// The connection became connected and the channel is subscribed.
    fn connected(&self) {}

    /// The connection was lost.
    fn disconnected(&self) {}

    /// The channel delivered a value.
    fn update(&self, _value: &Value) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl VariableHooks for NoHooks {}

/// Run a user callback, containing any error or panic it raises.
pub(crate) fn invoke_isolated<F>(kind: EventKind, channel: &ChannelName, callback: F)
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                event = %kind,
                channel = %channel,
                error = %e,
                "watcher callback failed"
            );
        }
        Err(payload) => {
            tracing::warn!(
                event = %kind,
                channel = %channel,
                panic = %panic_message(payload.as_ref()),
                "watcher callback panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
