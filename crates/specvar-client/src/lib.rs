//! Spec variable client - watchers for variables on Spec servers.
//!
//! This crate binds a single Spec variable to a connection and exposes it
//! as a small object that can be read, written, waited on and, in the
//! asynchronous variant, subscribed to.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use specvar_client::{
//!     AsyncVariableWatcher, CallbackResult, CallbackSet, DispatchMode, MemoryConnector, Value,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = Arc::new(MemoryConnector::new());
//!
//!     // Keep the callback alive for as long as it should fire
//!     let on_update = Arc::new(|value: &Value| -> CallbackResult {
//!         println!("tth = {}", value);
//!         Ok(())
//!     });
//!
//!     let mut tth = AsyncVariableWatcher::unbound(
//!         DispatchMode::UpdateValue,
//!         CallbackSet::new().on_update(&on_update),
//!     )
//!     .with_connector(connector);
//!     tth.bind("tth", "lid00a:fourc").await?;
//!
//!     tth.set_value(Value::Float(12.5)).await?;
//!     let next = tth.wait_update(None, Some(Duration::from_secs(5))).await?;
//!     println!("next value: {:?}", next);
//!     Ok(())
//! }
//! ```

pub mod async_variable;
pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod variable;
pub mod wait;

pub use async_variable::AsyncVariableWatcher;
pub use callback::{CallbackError, CallbackResult, CallbackSet, NoHooks, VariableHooks};
pub use config::WatcherConfig;
pub use connection::{Connection, ConnectionState, Connector, RegistrationId, Target};
pub use error::Error;
pub use memory::{MemoryConnection, MemoryConnector};
pub use variable::VariableWatcher;
pub use wait::WaitObject;

/// Re-export protocol types.
pub use specvar_proto as proto;
pub use specvar_proto::{ChannelName, DispatchMode, EventKind, Value};
