//! Inbound command routing.
//!
//! [`Router::handle`] classifies one inbound message, drops replays, and
//! dispatches on [`CommandKind`]. Errors are logged here and returned for
//! callers that care; none of them are fatal to the host.

use std::sync::{Arc, Mutex, MutexGuard};

use sairyne_core::logging::{preview, PREVIEW_CHARS};
use sairyne_core::{
    classify, BridgeConfig, BridgeError, Channel, Command, CommandKind, InboundMessage, PropertyStore, Result,
    StoreCell, StoreError,
};

use crate::dedup::RecentMessages;
use crate::host::{ContentHandle, UrlLauncher};
use crate::response::{data_loaded_marker, load_response_script, Delivery};

/// Latest resize signal from the content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceState {
    pub expanded: bool,
    /// Incremented on every resize signal, changed or not.
    pub revision: u64,
}

/// What handling one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Value written, flushed and read back.
    Saved { key: String },
    /// Save with an empty key or value; nothing written.
    Rejected,
    /// Load answered. `value` is empty on a miss.
    Loaded {
        key: String,
        value: String,
        delivery: Delivery,
    },
    /// URL handed to the launcher.
    Opened { url: String, launched: bool },
    /// Debug message written to the log.
    Logged,
    /// Resize signal recorded.
    Resized(SurfaceState),
    /// Same command seen within the dedup window; ignored.
    Duplicate,
}

#[derive(Debug, Default)]
struct RouterState {
    surface: SurfaceState,
    marker: Option<String>,
    /// Numbers published markers so repeated identical answers stay distinct.
    marker_seq: u64,
}

/// Dispatches inbound commands against the store and host capabilities.
pub struct Router {
    config: Arc<BridgeConfig>,
    store: Arc<StoreCell>,
    content: ContentHandle,
    launcher: Arc<dyn UrlLauncher>,
    recent: Mutex<RecentMessages>,
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<StoreCell>,
        content: ContentHandle,
        launcher: Arc<dyn UrlLauncher>,
    ) -> Self {
        let recent = RecentMessages::new(config.dedup_ttl());
        Self {
            config,
            store,
            content,
            launcher,
            recent: Mutex::new(recent),
            state: Mutex::new(RouterState::default()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Store handle for the embedding application's synchronous get/set.
    pub fn store(&self) -> std::result::Result<Arc<PropertyStore>, StoreError> {
        self.store.get()
    }

    /// Latest resize state.
    pub fn surface(&self) -> SurfaceState {
        self.state().surface
    }

    /// Most recent load answer published for polling, if any.
    pub fn current_marker(&self) -> Option<String> {
        self.state().marker.clone()
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn recent(&self) -> MutexGuard<'_, RecentMessages> {
        self.recent.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Classify and dispatch one inbound message.
    pub fn handle(&self, message: &InboundMessage) -> Result<Outcome> {
        let command = classify(message, &self.config).inspect_err(|e| {
            log::warn!("Dropped message on {}: {e}", message.channel());
        })?;
        self.dispatch(command, message.channel())
    }

    /// Dispatch an already classified command.
    pub fn dispatch(&self, command: Command, channel: Channel) -> Result<Outcome> {
        // Loads are answered every time: a content-side retry means the
        // previous answer did not arrive. Resize is a level signal and a
        // 1/0/1 toggle inside the window must not lose its last edge.
        let replayable = matches!(command.kind(), CommandKind::Load | CommandKind::Resize);
        if !replayable && !self.recent().admit(&command) {
            log::debug!("Duplicate {} via {channel}; ignored", command.kind());
            return Ok(Outcome::Duplicate);
        }

        log::debug!("{} via {channel}", command.kind());

        let result = match &command {
            Command::Save { key, value } => self.handle_save(key, value),
            Command::Load { key } => Ok(self.handle_load(key)),
            Command::OpenUrl { url } => Ok(self.handle_open_url(url)),
            Command::Debug { message } => {
                log::info!("[content] {}", preview(message, PREVIEW_CHARS));
                Ok(Outcome::Logged)
            }
            Command::Resize { expanded } => Ok(self.handle_resize(*expanded)),
        };

        if let Err(e) = &result {
            log::warn!("{} failed: {e}", command.kind());
            if matches!(e, BridgeError::StoreUnavailable(_)) {
                self.recent().forget(&command);
            }
        }
        result
    }

    fn handle_save(&self, key: &str, value: &str) -> Result<Outcome> {
        if key.is_empty() || value.is_empty() {
            log::debug!("Save rejected: empty key or value (key {key:?})");
            return Ok(Outcome::Rejected);
        }

        let store = self.store.get()?;
        store.set(key, value);
        if let Err(e) = store.save_if_needed() {
            log::warn!("Debounced save failed: {e}");
        }
        store.flush()?;

        let durable = store.durable_value(key)?.unwrap_or_default();
        if durable != value {
            return Err(BridgeError::VerificationMismatch {
                key: key.to_owned(),
                expected_len: value.len(),
                actual_len: durable.len(),
            });
        }

        log::info!("Saved {key} ({} bytes): {}", value.len(), preview(value, PREVIEW_CHARS));
        Ok(Outcome::Saved { key: key.to_owned() })
    }

    fn handle_load(&self, key: &str) -> Outcome {
        let value = match self.store.get() {
            Ok(store) => store.get(key, ""),
            Err(e) => {
                log::warn!("Load of {key} answered empty: {e}");
                String::new()
            }
        };
        if value.is_empty() {
            log::info!("Load miss: {key}");
        } else {
            log::info!("Loaded {key} ({} bytes)", value.len());
        }

        let delivery = self.respond(key, &value);
        Outcome::Loaded {
            key: key.to_owned(),
            value,
            delivery,
        }
    }

    /// Push a load answer: script first, then the polled marker.
    fn respond(&self, key: &str, value: &str) -> Delivery {
        match self.content.evaluate(&load_response_script(key, value, &self.config)) {
            Ok(()) => Delivery::Script,
            Err(e) => {
                log::debug!("Script delivery of {key} failed ({e}); publishing marker");
                let mut state = self.state();
                state.marker_seq += 1;
                let marker = data_loaded_marker(key, value, state.marker_seq, &self.config);
                state.marker = Some(marker.clone());
                Delivery::Marker(marker)
            }
        }
    }

    fn handle_open_url(&self, url: &str) -> Outcome {
        let launched = match self.launcher.launch(url) {
            Ok(()) => {
                log::info!("Opened {url}");
                true
            }
            Err(e) => {
                log::warn!("Failed to open {url}: {e}");
                false
            }
        };
        Outcome::Opened {
            url: url.to_owned(),
            launched,
        }
    }

    fn handle_resize(&self, expanded: bool) -> Outcome {
        let mut state = self.state();
        state.surface.expanded = expanded;
        state.surface.revision += 1;
        log::debug!("Surface expanded={expanded} (revision {})", state.surface.revision);
        Outcome::Resized(state.surface)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("content", &self.content)
            .field("surface", &self.surface())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptEvaluator;
    use sairyne_core::StoreConfig;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Launcher(Mutex<Vec<String>>);

    impl UrlLauncher for Launcher {
        fn launch(&self, url: &str) -> std::io::Result<()> {
            self.0.lock().unwrap().push(url.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Scripts(Mutex<Vec<String>>);

    impl ScriptEvaluator for Scripts {
        fn evaluate(&self, script: &str) -> Result<()> {
            self.0.lock().unwrap().push(script.to_owned());
            Ok(())
        }
    }

    fn router(dir: &TempDir) -> (Router, ContentHandle, Arc<Launcher>) {
        let config = Arc::new(BridgeConfig::default());
        let store = Arc::new(StoreCell::new(StoreConfig::at(dir.path().join("Sairyne.settings"))));
        let content = ContentHandle::new();
        let launcher = Arc::new(Launcher::default());
        let router = Router::new(config, store, content.clone(), launcher.clone());
        (router, content, launcher)
    }

    fn nav(url: &str) -> InboundMessage {
        InboundMessage::Navigation(url.to_owned())
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let (router, content, _) = router(&dir);
        let scripts = Arc::new(Scripts::default());
        content.attach(scripts.clone());

        let outcome = router.handle(&nav("juce://save?key=k&value=v%20w")).unwrap();
        assert_eq!(outcome, Outcome::Saved { key: "k".into() });

        let outcome = router.handle(&nav("juce://load?key=k")).unwrap();
        assert_eq!(
            outcome,
            Outcome::Loaded {
                key: "k".into(),
                value: "v w".into(),
                delivery: Delivery::Script,
            }
        );
        assert!(scripts.0.lock().unwrap()[0].contains("v='v w'"));
    }

    #[test]
    fn test_empty_save_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        assert_eq!(
            router.handle(&nav("juce://save?key=sairyne_users&value=")).unwrap(),
            Outcome::Rejected
        );
        assert!(!router.store().unwrap().contains("sairyne_users"));
    }

    #[test]
    fn test_load_miss_without_view_publishes_empty_marker() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        let outcome = router.handle(&nav("juce://load?key=absent")).unwrap();
        let marker = "sairyne://data_loaded?key=absent&value=&seq=1".to_owned();
        assert_eq!(
            outcome,
            Outcome::Loaded {
                key: "absent".into(),
                value: String::new(),
                delivery: Delivery::Marker(marker.clone()),
            }
        );
        assert_eq!(router.current_marker(), Some(marker));
    }

    #[test]
    fn test_repeated_miss_publishes_distinct_markers() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        router.handle(&nav("juce://load?key=absent")).unwrap();
        let first = router.current_marker().unwrap();
        router.handle(&nav("juce://load?key=absent")).unwrap();
        let second = router.current_marker().unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("&seq=2"));
    }

    #[test]
    fn test_save_after_other_value_is_not_a_duplicate() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        for value in ["A", "B", "A"] {
            let url = format!("juce://save?key=sairyne_selected_project&value={value}");
            assert!(matches!(router.handle(&nav(&url)).unwrap(), Outcome::Saved { .. }));
        }
        let store = router.store().unwrap();
        assert_eq!(store.get("sairyne_selected_project", ""), "A");
        assert_eq!(
            store.durable_value("sairyne_selected_project").unwrap().as_deref(),
            Some("A")
        );
    }

    #[test]
    fn test_unavailable_store_save_is_retried() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("settings");
        std::fs::write(&blocker, "not a directory").unwrap();

        let config = Arc::new(BridgeConfig::default());
        let store = Arc::new(StoreCell::new(StoreConfig::at(blocker.join("Sairyne.settings"))));
        let router = Router::new(config, store, ContentHandle::new(), Arc::new(Launcher::default()));

        let url = "juce://save?key=sairyne_users&value=%5B1%5D";
        assert!(matches!(router.handle(&nav(url)), Err(BridgeError::StoreUnavailable(_))));

        // Once the location becomes usable the same save goes through.
        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(
            router.handle(&nav(url)).unwrap(),
            Outcome::Saved {
                key: "sairyne_users".into()
            }
        );
        assert_eq!(router.store().unwrap().get("sairyne_users", ""), "[1]");
    }

    #[test]
    fn test_duplicate_save_is_ignored() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        let url = "juce://save?key=k&value=v";
        assert!(matches!(router.handle(&nav(url)).unwrap(), Outcome::Saved { .. }));
        assert_eq!(router.handle(&nav(url)).unwrap(), Outcome::Duplicate);
    }

    #[test]
    fn test_open_url_and_resize() {
        let dir = TempDir::new().unwrap();
        let (router, _, launcher) = router(&dir);

        let outcome = router
            .handle(&nav("juce://open_url?url=https%3A%2F%2Fsairyne.ai%2F"))
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Opened {
                url: "https://sairyne.ai/".into(),
                launched: true
            }
        );
        assert_eq!(launcher.0.lock().unwrap().as_slice(), ["https://sairyne.ai/"]);

        router.handle(&nav("sairyne://expanded=1")).unwrap();
        assert_eq!(
            router.surface(),
            SurfaceState {
                expanded: true,
                revision: 1
            }
        );
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (router, _, _) = router(&dir);
        assert!(matches!(
            router.handle(&nav("juce://explode?x=1")),
            Err(BridgeError::MalformedMessage(_))
        ));
    }
}
