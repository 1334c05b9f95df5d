//! Per-editor bridge session.
//!
//! [`BridgeSession`] is what the embedding editor talks to. It owns the
//! router and the host's ordered work queue, decides which navigations the
//! browser component may perform, and pushes persisted state into the
//! content once the application entry point starts loading.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use sairyne_core::{BridgeConfig, BridgeError, InboundMessage, Result, StoreCell};

use crate::assets;
use crate::host::{ContentHandle, UrlLauncher};
use crate::response::{init_entries, init_script};
use crate::router::{Outcome, Router};

// =========================================================================
// WorkQueue
// =========================================================================

type Task = Box<dyn FnOnce() + Send>;

/// Ordered queue of deferred host work, drained by the message loop.
#[derive(Clone, Default)]
pub struct WorkQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on a later [`pump`](Self::pump).
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Box::new(task));
    }

    /// Run the tasks queued before this call. Tasks they defer run on the
    /// next pump. Returns the number of tasks run.
    pub fn pump(&self) -> usize {
        let batch: Vec<Task> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("pending", &self.len()).finish()
    }
}

// =========================================================================
// BridgeSession
// =========================================================================

/// Answer to a browser component's "may I navigate here?" callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Cancel,
}

/// Bridge state for one editor instance.
pub struct BridgeSession {
    config: Arc<BridgeConfig>,
    store: Arc<StoreCell>,
    content: ContentHandle,
    launcher: Arc<dyn UrlLauncher>,
    router: Router,
    queue: WorkQueue,
}

impl BridgeSession {
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<StoreCell>,
        content: ContentHandle,
        launcher: Arc<dyn UrlLauncher>,
    ) -> Self {
        let router = Router::new(
            Arc::clone(&config),
            Arc::clone(&store),
            content.clone(),
            Arc::clone(&launcher),
        );
        Self {
            config,
            store,
            content,
            launcher,
            router,
            queue: WorkQueue::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn content(&self) -> &ContentHandle {
        &self.content
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Drain deferred work. Call from the host's message loop.
    pub fn pump(&self) -> usize {
        self.queue.pump()
    }

    /// A navigation started. Loading the application entry point schedules
    /// the startup injection two queue cycles later, after the page has had
    /// a chance to create its frame.
    pub fn on_load_start(&self, url: &str) {
        if !url.starts_with(&self.config.entry_url) {
            return;
        }
        log::info!("Entry point loading: {url}");

        let queue = self.queue.clone();
        let store = Arc::clone(&self.store);
        let content = self.content.clone();
        let config = Arc::clone(&self.config);
        self.queue.defer(move || {
            queue.defer(move || inject_persisted(&store, &content, &config));
        });
    }

    /// The page finished loading: install the content-side agent.
    pub fn on_page_loaded(&self) {
        if let Err(e) = self.content.evaluate(&assets::agent_script(&self.config)) {
            log::warn!("Agent script not installed: {e}");
        }
    }

    /// Decide whether the browser component may navigate to `url`.
    ///
    /// Host-scheme URLs are commands: routed and cancelled. The legacy
    /// scheme only carries the resize signal and the open-url fallback;
    /// load answers published there are the wrapper's business. Everything
    /// else is allowed.
    pub fn page_about_to_load(&self, url: &str) -> NavigationDecision {
        if has_prefix(url, &self.config.host_prefix()) {
            let _ = self.router.handle(&InboundMessage::Navigation(url.to_owned()));
            return NavigationDecision::Cancel;
        }

        if has_prefix(url, &self.config.legacy_prefix()) {
            let rest = &url[self.config.legacy_prefix().len()..];
            if rest.starts_with("data_loaded") {
                return NavigationDecision::Allow;
            }
            let routed = self.router.handle(&InboundMessage::Navigation(url.to_owned()));
            return match routed {
                Ok(Outcome::Resized(_)) => NavigationDecision::Allow,
                _ => NavigationDecision::Cancel,
            };
        }

        self.on_load_start(url);
        NavigationDecision::Allow
    }

    /// A navigation tried to open a new window. Web links go to the
    /// system browser; the legacy open-url signal is routed. New windows
    /// are never opened inside the plugin.
    pub fn new_window(&self, url: &str) -> NavigationDecision {
        if has_prefix(url, "http://") || has_prefix(url, "https://") {
            match self.launcher.launch(url) {
                Ok(()) => log::info!("Opened new window in browser: {url}"),
                Err(e) => log::warn!("Failed to open {url}: {e}"),
            }
        } else if has_prefix(url, &self.config.legacy_prefix()) || has_prefix(url, &self.config.host_prefix()) {
            let _ = self.router.handle(&InboundMessage::Navigation(url.to_owned()));
        } else {
            log::debug!("Ignored new window for {url}");
        }
        NavigationDecision::Cancel
    }

    /// A named event from the bridge object.
    pub fn on_event(&self, name: &str, payload: &Value) -> Result<Outcome> {
        self.router.handle(&InboundMessage::Event {
            name: name.to_owned(),
            payload: payload.clone(),
        })
    }

    /// A message posted to the wrapper page by the content frame.
    pub fn on_frame_message(&self, data: &Value) -> Result<Outcome> {
        self.router.handle(&InboundMessage::FrameMessage(data.clone()))
    }

    /// Raw IPC message from the web view: `{"type":"event","name":..,"data":..}`
    /// or a forwarded frame message.
    pub fn on_ipc_message(&self, json: &str) -> Result<Outcome> {
        let Ok(message) = serde_json::from_str::<Value>(json) else {
            log::warn!("Invalid IPC message JSON: {json}");
            return Err(BridgeError::MalformedMessage("invalid JSON".into()));
        };

        match message.get("type").and_then(Value::as_str) {
            Some("event") => {
                let name = message.get("name").and_then(Value::as_str).unwrap_or_default();
                let data = message.get("data").cloned().unwrap_or(Value::Null);
                self.on_event(name, &data)
            }
            _ => self.on_frame_message(&message),
        }
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("entry_url", &self.config.entry_url)
            .field("router", &self.router)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

fn has_prefix(url: &str, prefix: &str) -> bool {
    url.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Push every persisted entry of the configured key set into the content.
fn inject_persisted(store: &StoreCell, content: &ContentHandle, config: &BridgeConfig) {
    let store = match store.get() {
        Ok(store) => store,
        Err(e) => {
            log::warn!("Startup injection skipped: {e}");
            return;
        }
    };

    let entries = init_entries(&store, &config.persisted_keys);
    if entries.is_empty() {
        log::info!("Startup injection skipped: nothing persisted");
        return;
    }

    match content.evaluate(&init_script(&entries, config)) {
        Ok(()) => log::info!("Injected {} persisted entries", entries.len()),
        Err(e) => log::warn!("Startup injection failed: {e}"),
    }
}
