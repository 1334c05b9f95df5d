//! # Sairyne
//!
//! Bridge protocol and persistence layer for the Sairyne audio plugin.
//!
//! The plugin's editor is a web view pointing at a remote chat application.
//! This crate moves commands between that untrusted content and the native
//! host, and keeps the content's state in a durable key/value store.
//!
//! ## Architecture
//!
//! ```text
//! content (agent.js / Agent)
//!        ↓  event emission, alternate bridge, frame post, juce:// URL
//! BridgeSession → Router → PropertyStore
//!        ↑  juce_data_loaded / juce_init script, data_loaded marker
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sairyne::prelude::*;
//!
//! // Once per process, shared by every plugin instance:
//! let process = HostProcess::from_config_file(Path::new("Bridge.toml"))?;
//!
//! // Per instance:
//! let host = HostContext::new(&process);
//! host.session().content().attach(my_web_view_evaluator);
//!
//! // From the browser component's callbacks:
//! match host.session().page_about_to_load(url) {
//!     NavigationDecision::Allow => {}
//!     NavigationDecision::Cancel => return false,
//! }
//!
//! // From the message loop:
//! host.session().pump();
//! ```

// Re-export sub-crates
pub use sairyne_core as core;
pub use sairyne_utils as utils;

#[cfg(feature = "bridge")]
pub use sairyne_bridge as bridge;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sairyne::prelude::*;
/// ```
pub mod prelude {
    pub use sairyne_core::{
        // Commands
        classify, Channel, Command, CommandKind, InboundMessage,
        // Configuration
        BridgeConfig, StoreConfig,
        // Errors
        BridgeError, Result, StoreError,
        // Persistence
        PropertyStore, StoreCell, DEFAULT_PERSISTED_KEYS,
        // Lifecycle and diagnostics
        InstanceGuard, InstanceRegistry, LogContext,
    };

    pub use sairyne_utils::{decode_from_transport, encode_for_transport};

    #[cfg(feature = "bridge")]
    pub use sairyne_bridge::{
        // Host side
        BridgeSession, ContentHandle, HostContext, HostProcess, NavigationDecision, Outcome, Router, SurfaceState, WorkQueue,
        // Platform capabilities
        ScriptEvaluator, SystemBrowser, UrlLauncher,
        // Content side
        Agent, AttachState, ContentEnv, HostMessage, PendingDelivery, Sent,
    };
}
