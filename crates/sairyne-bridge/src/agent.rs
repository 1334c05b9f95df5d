//! Content-side agent.
//!
//! The agent runs inside the content context. It normalizes whatever the
//! content posts into a [`Command`], then pushes it towards the host over
//! the first channel that does not fail:
//!
//! 1. event emission on the attached bridge object
//! 2. the alternate bridge handle
//! 3. a cross-frame post to the wrapper page, when nested
//! 4. custom-scheme navigation, which is always available
//!
//! It also consumes what the host sends back (`juce_init`,
//! `juce_data_loaded` and the polled `data_loaded` marker) and keeps a
//! mirror of the persisted values.
//!
//! [`Agent`] is generic over [`ContentEnv`] so the same logic drives the
//! shipped script's behavior in tests. `assets/agent.js` is its browser
//! rendition.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use sairyne_core::{BridgeConfig, BridgeError, Channel, Command, CommandKind, Result};

use crate::response::parse_data_loaded_marker;

/// Messaging primitives of the content context.
///
/// Every method that sends returns an error when the primitive is missing
/// or throws; the agent then moves on to the next channel.
pub trait ContentEnv {
    /// Whether the host bridge object is reachable yet.
    fn bridge_present(&mut self) -> bool;

    /// Emit a named event on the bridge object.
    fn emit_event(&mut self, name: &str, payload: &Value) -> Result<()>;

    /// Emit a named event through the alternate bridge handle.
    fn emit_alternate(&mut self, name: &str, payload: &Value) -> Result<()>;

    /// Post to the enclosing wrapper page. Fails when not nested.
    fn post_to_parent(&mut self, message: &Value) -> Result<()>;

    /// Navigate to a custom-scheme URL.
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Load answer currently published by the host for polling.
    fn read_marker(&mut self) -> Option<String> {
        None
    }
}

/// Progress of finding the bridge object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Pending { attempts: u32 },
    Attached,
    /// Budget spent; only the fallback channels are used.
    GaveUp,
}

/// One command on its way to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub command: Command,
    pub attempts: u32,
    /// Channels tried, in order.
    pub channels: Vec<Channel>,
}

impl PendingDelivery {
    fn new(command: Command) -> Self {
        Self {
            command,
            attempts: 0,
            channels: Vec::new(),
        }
    }

    /// Channel that finally carried the command.
    pub fn delivered_via(&self) -> Option<Channel> {
        self.channels.last().copied()
    }
}

/// Result of handing a command to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// Held until the host is ready.
    Queued,
    Delivered(PendingDelivery),
}

/// Host-to-content message the agent consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    DataLoaded { key: String, value: String },
    Init { entries: usize },
}

/// Content-side half of the bridge.
#[derive(Debug)]
pub struct Agent<E: ContentEnv> {
    env: E,
    config: Arc<BridgeConfig>,
    attach: AttachState,
    initialized: bool,
    queue: VecDeque<Command>,
    mirror: BTreeMap<String, String>,
    pending_loads: BTreeSet<String>,
    last_marker: Option<String>,
}

impl<E: ContentEnv> Agent<E> {
    pub fn new(env: E, config: Arc<BridgeConfig>) -> Self {
        Self {
            env,
            config,
            attach: AttachState::Pending { attempts: 0 },
            initialized: false,
            queue: VecDeque::new(),
            mirror: BTreeMap::new(),
            pending_loads: BTreeSet::new(),
            last_marker: None,
        }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn attach_state(&self) -> AttachState {
        self.attach
    }

    /// Saves and loads are held back until the host has pushed its state or
    /// the attach poll has settled.
    pub fn is_ready(&self) -> bool {
        self.initialized || !matches!(self.attach, AttachState::Pending { .. })
    }

    /// Mirrored value of `key`, as last saved or received.
    pub fn stored(&self, key: &str) -> Option<&str> {
        self.mirror.get(key).map(String::as_str)
    }

    /// Whether a load of `key` is still waiting for its answer.
    pub fn is_loading(&self, key: &str) -> bool {
        self.pending_loads.contains(key)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// One tick of the attach poll. Once attached (or out of attempts)
    /// further calls are no-ops.
    pub fn poll_attach(&mut self) -> AttachState {
        let AttachState::Pending { attempts } = self.attach else {
            return self.attach;
        };

        let attempts = attempts + 1;
        self.attach = if self.env.bridge_present() {
            log::debug!("Bridge attached after {attempts} attempts");
            AttachState::Attached
        } else if attempts >= self.config.attach_attempts {
            log::debug!("Bridge not found after {attempts} attempts; using fallbacks");
            AttachState::GaveUp
        } else {
            AttachState::Pending { attempts }
        };

        if self.is_ready() {
            self.flush_queue();
        }
        self.attach
    }

    pub fn save(&mut self, key: &str, value: &str) -> Result<Sent> {
        self.send(Command::Save {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }

    pub fn load(&mut self, key: &str) -> Result<Sent> {
        self.send(Command::Load { key: key.to_owned() })
    }

    /// Hand a command to the agent.
    pub fn send(&mut self, command: Command) -> Result<Sent> {
        match &command {
            Command::Save { key, value } if !value.is_empty() => {
                self.mirror.insert(key.clone(), value.clone());
            }
            Command::Load { key } => {
                self.pending_loads.insert(key.clone());
            }
            _ => {}
        }

        if !self.is_ready() && matches!(command.kind(), CommandKind::Save | CommandKind::Load) {
            self.queue.push_back(command);
            return Ok(Sent::Queued);
        }
        self.deliver(command).map(Sent::Delivered)
    }

    /// Wrapped messaging primitive: recognized messages are redirected to
    /// the host, anything else returns `None` and passes through untouched.
    pub fn intercept(&mut self, message: &Value) -> Option<Result<Sent>> {
        let command = Command::from_content_message(message).ok()?;
        Some(self.send(command))
    }

    /// Push `command` over the first channel that accepts it.
    pub fn deliver(&mut self, command: Command) -> Result<PendingDelivery> {
        let mut delivery = PendingDelivery::new(command);
        let event = delivery.command.to_event();

        if let Some((name, payload)) = &event {
            if self.attach == AttachState::Attached {
                delivery.attempts += 1;
                delivery.channels.push(Channel::EventEmission);
                if self.env.emit_event(name, payload).is_ok() {
                    return Ok(delivery);
                }
            }

            delivery.attempts += 1;
            delivery.channels.push(Channel::EventEmission);
            if self.env.emit_alternate(name, payload).is_ok() {
                return Ok(delivery);
            }
        }

        delivery.attempts += 1;
        delivery.channels.push(Channel::FramePost);
        if self.env.post_to_parent(&delivery.command.to_envelope()).is_ok() {
            return Ok(delivery);
        }

        delivery.attempts += 1;
        delivery.channels.push(Channel::CustomScheme);
        let url = delivery.command.to_url(&self.config);
        match self.env.navigate(&url) {
            Ok(()) => Ok(delivery),
            Err(e) => {
                log::debug!(
                    "Dropped {} after {} attempts: {e}",
                    delivery.command.kind(),
                    delivery.attempts
                );
                Err(BridgeError::MissingEndpoint)
            }
        }
    }

    fn flush_queue(&mut self) {
        while let Some(command) = self.queue.pop_front() {
            if let Err(e) = self.deliver(command) {
                log::debug!("Queued command lost: {e}");
            }
        }
    }

    /// Consume a message posted into the content by the host.
    pub fn on_host_message(&mut self, data: &Value) -> Option<HostMessage> {
        match data.get("type").and_then(Value::as_str)? {
            "juce_data_loaded" => {
                let key = data.get("key").and_then(Value::as_str)?.to_owned();
                let value = data
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Some(self.data_loaded(key, value))
            }
            "juce_init" => {
                let entries = data.get("data").and_then(Value::as_object)?;
                for (key, value) in entries {
                    if let Some(value) = value.as_str().filter(|v| !v.is_empty()) {
                        self.mirror.insert(key.clone(), value.to_owned());
                    }
                }
                self.initialized = true;
                self.flush_queue();
                Some(HostMessage::Init {
                    entries: entries.len(),
                })
            }
            _ => None,
        }
    }

    /// One tick of the marker poll. A marker is consumed once.
    pub fn poll_marker(&mut self) -> Option<HostMessage> {
        let marker = self.env.read_marker()?;
        if self.last_marker.as_deref() == Some(marker.as_str()) {
            return None;
        }
        let (key, value) = parse_data_loaded_marker(&marker, &self.config)?;
        self.last_marker = Some(marker);
        Some(self.data_loaded(key, value))
    }

    fn data_loaded(&mut self, key: String, value: String) -> HostMessage {
        self.pending_loads.remove(&key);
        if !value.is_empty() {
            self.mirror.insert(key.clone(), value.clone());
        }
        HostMessage::DataLoaded { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records what each channel received; channels can be switched off.
    #[derive(Debug, Default)]
    struct Recorder {
        bridge: bool,
        events_fail: bool,
        alternate: bool,
        nested: bool,
        events: Vec<String>,
        posts: Vec<Value>,
        urls: Vec<String>,
        marker: Option<String>,
    }

    impl ContentEnv for Recorder {
        fn bridge_present(&mut self) -> bool {
            self.bridge
        }

        fn emit_event(&mut self, name: &str, _payload: &Value) -> Result<()> {
            if self.events_fail {
                return Err(BridgeError::MissingEndpoint);
            }
            self.events.push(name.to_owned());
            Ok(())
        }

        fn emit_alternate(&mut self, name: &str, _payload: &Value) -> Result<()> {
            if !self.alternate {
                return Err(BridgeError::MissingEndpoint);
            }
            self.events.push(format!("alt:{name}"));
            Ok(())
        }

        fn post_to_parent(&mut self, message: &Value) -> Result<()> {
            if !self.nested {
                return Err(BridgeError::MissingEndpoint);
            }
            self.posts.push(message.clone());
            Ok(())
        }

        fn navigate(&mut self, url: &str) -> Result<()> {
            self.urls.push(url.to_owned());
            Ok(())
        }

        fn read_marker(&mut self) -> Option<String> {
            self.marker.clone()
        }
    }

    fn agent(env: Recorder) -> Agent<Recorder> {
        Agent::new(env, Arc::new(BridgeConfig::default()))
    }

    #[test]
    fn test_attach_polls_until_found() {
        let mut agent = agent(Recorder::default());
        assert_eq!(agent.poll_attach(), AttachState::Pending { attempts: 1 });
        agent.env_mut().bridge = true;
        assert_eq!(agent.poll_attach(), AttachState::Attached);
        // Guarded: no further probing.
        agent.env_mut().bridge = false;
        assert_eq!(agent.poll_attach(), AttachState::Attached);
    }

    #[test]
    fn test_attach_gives_up_after_budget() {
        let mut agent = agent(Recorder::default());
        for _ in 0..39 {
            assert!(matches!(agent.poll_attach(), AttachState::Pending { .. }));
        }
        assert_eq!(agent.poll_attach(), AttachState::GaveUp);
        assert!(agent.is_ready());
    }

    #[test]
    fn test_saves_queue_until_ready() {
        let mut agent = agent(Recorder {
            bridge: true,
            ..Recorder::default()
        });
        assert_eq!(agent.save("k", "v").unwrap(), Sent::Queued);
        assert_eq!(agent.stored("k"), Some("v"));
        assert!(agent.env().events.is_empty());

        agent.poll_attach();
        assert_eq!(agent.queued(), 0);
        assert_eq!(agent.env().events, ["saveData"]);
    }

    #[test]
    fn test_channel_order_falls_through() {
        let mut agent = agent(Recorder {
            bridge: true,
            events_fail: true,
            nested: true,
            ..Recorder::default()
        });
        agent.poll_attach();

        let Sent::Delivered(delivery) = agent.save("k", "v").unwrap() else {
            panic!("expected delivery");
        };
        assert_eq!(
            delivery.channels,
            [Channel::EventEmission, Channel::EventEmission, Channel::FramePost]
        );
        assert_eq!(delivery.attempts, 3);
        assert_eq!(agent.env().posts[0]["type"], "JUCE_DATA");
    }

    #[test]
    fn test_custom_scheme_is_last_resort() {
        let mut agent = agent(Recorder::default());
        for _ in 0..40 {
            agent.poll_attach();
        }
        let Sent::Delivered(delivery) = agent.send(Command::Debug { message: "hi there".into() }).unwrap() else {
            panic!("expected delivery");
        };
        assert_eq!(delivery.delivered_via(), Some(Channel::CustomScheme));
        assert_eq!(agent.env().urls, ["juce://debug?message=hi%20there"]);
    }

    #[test]
    fn test_intercept_normalizes_legacy_shapes() {
        let mut agent = agent(Recorder {
            bridge: true,
            ..Recorder::default()
        });
        agent.poll_attach();

        assert!(agent.intercept(&json!("sairyne:resize:1")).is_some());
        assert!(agent
            .intercept(&json!({"type": "save_data", "payload": {"key": "k", "value": "v"}}))
            .is_some());
        assert!(agent.intercept(&json!({"hello": "world"})).is_none());
        assert_eq!(agent.env().events, ["sairyneResize", "saveData"]);
    }

    #[test]
    fn test_init_mirrors_and_flushes() {
        let mut agent = agent(Recorder::default());
        assert_eq!(agent.load("sairyne_users").unwrap(), Sent::Queued);

        let message = json!({"type": "juce_init", "data": {"sairyne_users": "[1]", "sairyne_projects": ""}});
        assert_eq!(agent.on_host_message(&message), Some(HostMessage::Init { entries: 2 }));
        assert_eq!(agent.stored("sairyne_users"), Some("[1]"));
        assert_eq!(agent.stored("sairyne_projects"), None);
        assert_eq!(agent.queued(), 0);
        assert_eq!(agent.env().urls, ["juce://load?key=sairyne_users"]);
    }

    #[test]
    fn test_empty_answer_clears_pending_load() {
        let mut agent = agent(Recorder::default());
        for _ in 0..40 {
            agent.poll_attach();
        }
        agent.load("absent").unwrap();
        assert!(agent.is_loading("absent"));

        let answer = json!({"type": "juce_data_loaded", "key": "absent", "value": ""});
        agent.on_host_message(&answer);
        assert!(!agent.is_loading("absent"));
        assert_eq!(agent.stored("absent"), None);
    }

    #[test]
    fn test_marker_is_consumed_once() {
        let mut agent = agent(Recorder {
            marker: Some("sairyne://data_loaded?key=k&value=a%20b".into()),
            ..Recorder::default()
        });
        assert_eq!(
            agent.poll_marker(),
            Some(HostMessage::DataLoaded {
                key: "k".into(),
                value: "a b".into()
            })
        );
        assert_eq!(agent.poll_marker(), None);
        assert_eq!(agent.stored("k"), Some("a b"));
    }
}
