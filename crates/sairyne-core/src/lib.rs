//! Core abstractions for the Sairyne plugin bridge.
//!
//! This crate holds everything the bridge needs that does not depend on a
//! live content context: the command vocabulary and its classifier, the
//! durable key/value store, configuration, and the logging context.

pub mod command;
pub mod config;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod logging;
pub mod store;

pub use command::{classify, Channel, Command, CommandKind, InboundMessage};
pub use config::{BridgeConfig, StoreConfig};
pub use error::{BridgeError, Result, StoreError};
pub use keys::DEFAULT_PERSISTED_KEYS;
pub use lifecycle::{InstanceGuard, InstanceRegistry};
pub use logging::LogContext;
pub use store::{PropertyStore, StoreCell};
