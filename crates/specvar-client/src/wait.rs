//! One-shot wait for a channel update.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use specvar_proto::{ChannelName, DispatchMode, Value};

use crate::connection::{Connection, RegistrationId, UpdateHandler};
use crate::error::Error;

/// Waits for the next update of a channel on a connection.
///
/// The wait registers its own channel handler in
/// [`DispatchMode::FireEvent`] mode, so repeated values count as updates.
/// The registration is removed once the wait resolves, or when the object
/// is dropped while a wait is still pending.
pub struct WaitObject {
    conn: Arc<dyn Connection>,
    registration: Option<RegistrationId>,
    value: Option<Value>,
}

impl WaitObject {
    /// Create a wait object bound to a connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            registration: None,
            value: None,
        }
    }

    /// Wait until the channel delivers an update.
    ///
    /// With `wait_value`, updates carrying any other value are skipped.
    /// Returns `Ok(None)` if the connection drops the registration before a
    /// qualifying update arrives (the connection was lost), and
    /// [`Error::Timeout`] if `timeout` elapses first.
    pub async fn wait_channel_update(
        &mut self,
        channel: &ChannelName,
        wait_value: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, Error> {
        self.release();
        self.value = None;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: UpdateHandler = Arc::new(move |value: &Value| {
            // Fails only once the waiter has gone.
            let _ = tx.send(value.clone());
        });
        self.registration = Some(self.conn.register_channel(
            channel,
            handler,
            DispatchMode::FireEvent,
        ));

        tracing::debug!(
            channel = %channel,
            wait_value = ?wait_value,
            timeout = ?timeout,
            "waiting for channel update"
        );

        let arrival = async {
            while let Some(value) = rx.recv().await {
                if wait_value.as_ref().map_or(true, |expected| *expected == value) {
                    return Some(value);
                }
            }
            None
        };

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, arrival)
                .await
                .map_err(|_| Error::Timeout),
            None => Ok(arrival.await),
        };
        self.release();

        match &result {
            Ok(Some(value)) => {
                tracing::trace!(channel = %channel, value = %value, "wait resolved");
                self.value = Some(value.clone());
            }
            Ok(None) => tracing::debug!(channel = %channel, "channel dropped while waiting"),
            Err(_) => tracing::debug!(channel = %channel, "wait timed out"),
        }

        result
    }

    /// Value delivered by the last successful wait.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn release(&mut self) {
        if let Some(id) = self.registration.take() {
            self.conn.unregister_channel(id);
        }
    }
}

impl Drop for WaitObject {
    fn drop(&mut self) {
        self.release();
    }
}
