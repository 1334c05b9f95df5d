//! Bridge between the plugin host and its embedded web content.
//!
//! The content context can only reach the host through narrow string
//! channels. This crate turns those channels into one typed command stream:
//!
//! - [`BridgeSession`] is the host-side entry point. It answers navigation
//!   callbacks, receives events and frame messages, and injects persisted
//!   state at startup through its [`WorkQueue`].
//! - [`Router`] dispatches commands against the store and answers loads.
//! - [`Agent`] is the content-side half: normalization, channel fallback
//!   and the mirror of persisted values. `assets/agent.js` is the script
//!   shipped to the browser.
//!
//! The platform is reached only through [`ScriptEvaluator`] and
//! [`UrlLauncher`]. [`HostProcess`] holds the store and instance registry
//! shared by every plugin instance in the process; [`HostContext`] bundles
//! one instance's session with its registration and log file.

pub mod agent;
pub mod assets;
pub mod context;
pub mod dedup;
pub mod host;
pub mod response;
pub mod router;
pub mod session;

pub use agent::{Agent, AttachState, ContentEnv, HostMessage, PendingDelivery, Sent};
pub use context::{HostContext, HostProcess};
pub use host::{ContentHandle, ScriptEvaluator, SystemBrowser, UrlLauncher};
pub use response::Delivery;
pub use router::{Outcome, Router, SurfaceState};
pub use session::{BridgeSession, NavigationDecision, WorkQueue};
