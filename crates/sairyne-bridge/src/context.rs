//! Process-wide and per-instance host state.

use std::path::Path;
use std::sync::Arc;

use sairyne_core::{
    BridgeConfig, InstanceGuard, InstanceRegistry, LogContext, PropertyStore, StoreCell, StoreError,
};

use crate::host::{ContentHandle, SystemBrowser, UrlLauncher};
use crate::session::BridgeSession;

/// State shared by every plugin instance in the process.
///
/// The embedding plugin creates one and hands it to each [`HostContext`].
/// All instances then read and write the same store handle, so no instance
/// can overwrite another's keys with a stale snapshot. The store is flushed
/// and released when the last reference goes away.
#[derive(Debug)]
pub struct HostProcess {
    config: Arc<BridgeConfig>,
    store: Arc<StoreCell>,
    instances: Arc<InstanceRegistry>,
}

impl HostProcess {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let store = Arc::new(StoreCell::new(config.store.clone()));
        Arc::new(Self {
            config: Arc::new(config),
            store,
            instances: Arc::new(InstanceRegistry::new()),
        })
    }

    /// Load `Bridge.toml` from `path` (defaults when missing).
    pub fn from_config_file(path: &Path) -> Result<Arc<Self>, String> {
        Ok(Self::new(BridgeConfig::load(path)?))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Synchronous store access for the embedding application.
    pub fn store(&self) -> Result<Arc<PropertyStore>, StoreError> {
        self.store.get()
    }

    /// Number of live [`HostContext`]s.
    pub fn live_instances(&self) -> usize {
        self.instances.live_count()
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        self.store.close();
    }
}

/// Everything one plugin instance holds for the bridge: its editor session,
/// its registration with the process, and (for the first live instance) the
/// log file.
#[derive(Debug)]
pub struct HostContext {
    session: Arc<BridgeSession>,
    // Dropped after the session so its teardown is logged.
    _log: Option<LogContext>,
    guard: InstanceGuard,
    process: Arc<HostProcess>,
}

impl HostContext {
    /// Create an instance that opens URLs with the system browser.
    pub fn new(process: &Arc<HostProcess>) -> Self {
        Self::with_launcher(process, Arc::new(SystemBrowser))
    }

    pub fn with_launcher(process: &Arc<HostProcess>, launcher: Arc<dyn UrlLauncher>) -> Self {
        let guard = process.instances.acquire();
        let log = guard.is_primary().then(|| LogContext::init(&process.config));

        let session = Arc::new(BridgeSession::new(
            Arc::clone(&process.config),
            Arc::clone(&process.store),
            ContentHandle::new(),
            launcher,
        ));
        log::info!("Bridge ready (entry point {})", process.config.entry_url);

        Self {
            session,
            _log: log,
            guard,
            process: Arc::clone(process),
        }
    }

    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    /// Synchronous store access for the embedding application.
    pub fn store(&self) -> Result<Arc<PropertyStore>, StoreError> {
        self.process.store()
    }

    pub fn process(&self) -> &Arc<HostProcess> {
        &self.process
    }

    pub fn is_primary(&self) -> bool {
        self.guard.is_primary()
    }
}

impl Drop for HostContext {
    fn drop(&mut self) {
        self.session.content().invalidate();
        self.process.store.flush();
    }
}
