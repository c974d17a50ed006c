//! Spec variable protocol types.
//!
//! This crate defines the types that watchers and connections must agree on
//! when talking about Spec variables.
//!
//! # Modules
//!
//! - [`value`] - Values carried by channels
//! - [`channel`] - Channel name resolution
//! - [`dispatch`] - Dispatch modes and event kinds
//! - [`address`] - Spec server addresses
//! - [`error`] - Protocol error types
//!
//! # Channel names
//!
//! ```
//! use specvar_proto::ChannelName;
//!
//! assert_eq!(ChannelName::resolve("motor").unwrap().as_str(), "var/motor");
//! assert_eq!(ChannelName::resolve("status/ready").unwrap().as_str(), "status/ready");
//! ```

pub mod address;
pub mod channel;
pub mod dispatch;
pub mod error;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use address::{SpecAddress, SpecPort};
pub use channel::{ChannelName, VARIABLE_PREFIX};
pub use dispatch::{DispatchMode, EventKind};
pub use value::Value;
