//! Canonical command vocabulary and the inbound classifier.
//!
//! Every way content can reach the host (custom-scheme navigation, named
//! events, cross-frame messages) is parsed once here into a [`Command`].
//! Anything that does not match a known shape is rejected with
//! [`BridgeError::MalformedMessage`] instead of being inspected further.

use serde_json::{json, Value};

use sairyne_utils::{encode_for_transport, query_param};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

// =========================================================================
// Command
// =========================================================================

/// Kind of a cross-boundary request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Save,
    Load,
    OpenUrl,
    Debug,
    Resize,
}

impl CommandKind {
    /// Command word used in cross-frame envelopes (`{type:'JUCE_DATA', command}`).
    pub const fn envelope_command(self) -> &'static str {
        match self {
            Self::Save => "save_data",
            Self::Load => "load_data",
            Self::OpenUrl => "open_url",
            Self::Debug => "debug",
            Self::Resize => "resize",
        }
    }

    /// Resolve an envelope or URL command word, accepting both vocabularies.
    pub fn from_command_word(word: &str) -> Option<Self> {
        match word {
            "save" | "save_data" | "sairyne_save_data" => Some(Self::Save),
            "load" | "load_data" | "sairyne_load_data" => Some(Self::Load),
            "open_url" => Some(Self::OpenUrl),
            "debug" | "log_message" => Some(Self::Debug),
            "resize" => Some(Self::Resize),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.envelope_command())
    }
}

/// A typed cross-boundary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Persist `value` under `key`.
    Save { key: String, value: String },
    /// Read `key` and push the value (or an empty response) back.
    Load { key: String },
    /// Open a URL in the system browser.
    OpenUrl { url: String },
    /// Log a message from the content side.
    Debug { message: String },
    /// The embedding surface should expand or collapse.
    Resize { expanded: bool },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Save { .. } => CommandKind::Save,
            Self::Load { .. } => CommandKind::Load,
            Self::OpenUrl { .. } => CommandKind::OpenUrl,
            Self::Debug { .. } => CommandKind::Debug,
            Self::Resize { .. } => CommandKind::Resize,
        }
    }

    /// Identity used for replay suppression: `(kind, key, value)`.
    pub fn fingerprint(&self) -> (CommandKind, &str, &str) {
        match self {
            Self::Save { key, value } => (CommandKind::Save, key.as_str(), value.as_str()),
            Self::Load { key } => (CommandKind::Load, key.as_str(), ""),
            Self::OpenUrl { url } => (CommandKind::OpenUrl, url.as_str(), ""),
            Self::Debug { message } => (CommandKind::Debug, message.as_str(), ""),
            Self::Resize { expanded } => (CommandKind::Resize, if *expanded { "1" } else { "0" }, ""),
        }
    }

    /// Custom-scheme URL carrying this command. Always available; the URL
    /// length is the only constraint.
    pub fn to_url(&self, config: &BridgeConfig) -> String {
        let host = config.host_prefix();
        match self {
            Self::Save { key, value } => format!(
                "{host}save?key={}&value={}",
                encode_for_transport(key),
                encode_for_transport(value)
            ),
            Self::Load { key } => format!("{host}load?key={}", encode_for_transport(key)),
            Self::OpenUrl { url } => format!("{host}open_url?url={}", encode_for_transport(url)),
            Self::Debug { message } => {
                format!("{host}debug?message={}", encode_for_transport(message))
            }
            Self::Resize { expanded } => {
                format!("{}expanded={}", config.legacy_prefix(), u8::from(*expanded))
            }
        }
    }

    /// Named event carrying this command, if the kind has one.
    pub fn to_event(&self) -> Option<(&'static str, Value)> {
        match self {
            Self::Save { key, value } => Some(("saveData", json!({ "key": key, "value": value }))),
            Self::Load { key } => Some(("loadData", json!({ "key": key }))),
            Self::OpenUrl { url } => Some(("openUrl", json!({ "url": url }))),
            Self::Resize { expanded } => Some((
                "sairyneResize",
                json!({
                    "expanded": expanded,
                    "value": if *expanded { "1" } else { "0" },
                    "source": "agent",
                }),
            )),
            Self::Debug { .. } => None,
        }
    }

    /// Cross-frame envelope carrying this command.
    pub fn to_envelope(&self) -> Value {
        match self {
            Self::Resize { expanded } => json!({ "source": "sairyne", "expanded": expanded }),
            Self::Save { key, value } => envelope(self.kind(), json!({ "key": key, "value": value })),
            Self::Load { key } => envelope(self.kind(), json!({ "key": key })),
            Self::OpenUrl { url } => envelope(self.kind(), json!({ "url": url })),
            Self::Debug { message } => envelope(self.kind(), json!({ "message": message })),
        }
    }
}

fn envelope(kind: CommandKind, payload: Value) -> Value {
    json!({ "type": "JUCE_DATA", "command": kind.envelope_command(), "payload": payload })
}

// =========================================================================
// Channel
// =========================================================================

/// Concrete transport a command travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Navigation to a custom-scheme URL intercepted by the host.
    CustomScheme,
    /// Named event emitted on the bridge object.
    EventEmission,
    /// `postMessage` between frames.
    FramePost,
    /// A marker the receiving side checks on a timer.
    Poll,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CustomScheme => "custom-scheme",
            Self::EventEmission => "event",
            Self::FramePost => "frame-post",
            Self::Poll => "poll",
        })
    }
}

// =========================================================================
// Inbound classification
// =========================================================================

/// Raw message as it arrives at the host, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// URL of an intercepted navigation or new-window request.
    Navigation(String),
    /// Named event with its payload.
    Event { name: String, payload: Value },
    /// Cross-frame message data, as the content posted it.
    FrameMessage(Value),
}

impl InboundMessage {
    /// Channel this message arrived on.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Navigation(_) => Channel::CustomScheme,
            Self::Event { .. } => Channel::EventEmission,
            Self::FrameMessage(_) => Channel::FramePost,
        }
    }
}

/// Classify a raw inbound message into a canonical command.
pub fn classify(message: &InboundMessage, config: &BridgeConfig) -> Result<Command> {
    match message {
        InboundMessage::Navigation(url) => classify_url(url, config),
        InboundMessage::Event { name, payload } => classify_event(name, payload),
        InboundMessage::FrameMessage(data) => Command::from_content_message(data),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

fn malformed(what: impl Into<String>) -> BridgeError {
    BridgeError::MalformedMessage(what.into())
}

/// Classify a custom-scheme URL.
///
/// Exact command words on either scheme win. Anything else on the legacy
/// scheme is checked for the resize signal, then rejected.
pub fn classify_url(url: &str, config: &BridgeConfig) -> Result<Command> {
    let rest = strip_prefix_ignore_case(url, &config.host_prefix())
        .or_else(|| strip_prefix_ignore_case(url, &config.legacy_prefix()))
        .ok_or_else(|| malformed("not a bridge scheme"))?;

    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let word = path.trim_end_matches('/');

    if let Some(kind) = CommandKind::from_command_word(word) {
        let param = |name: &str| {
            query_param(query, name).ok_or_else(|| malformed(format!("{word}: missing {name}")))
        };
        return match kind {
            CommandKind::Save => Ok(Command::Save {
                key: param("key")?,
                value: param("value")?,
            }),
            CommandKind::Load => Ok(Command::Load { key: param("key")? }),
            CommandKind::OpenUrl => Ok(Command::OpenUrl { url: param("url")? }),
            CommandKind::Debug => Ok(Command::Debug {
                message: param("message")?,
            }),
            CommandKind::Resize => Ok(Command::Resize {
                expanded: param("expanded")? == "1",
            }),
        };
    }

    // Legacy handler: only the resize signal.
    if let Some(flag) = rest.strip_prefix("expanded=") {
        return Ok(Command::Resize {
            expanded: flag.starts_with('1'),
        });
    }

    Err(malformed(format!("unrecognized command {word:?}")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("expanded")
        }
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn str_field(object: &Value, name: &str) -> Option<String> {
    match object.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Classify a named event from the bridge object.
pub fn classify_event(name: &str, payload: &Value) -> Result<Command> {
    match name {
        "sairyneResize" => {
            let expanded = match payload {
                Value::Object(_) => payload
                    .get("expanded")
                    .or_else(|| payload.get("value"))
                    .is_some_and(truthy),
                other => truthy(other),
            };
            Ok(Command::Resize { expanded })
        }
        "openUrl" => {
            let url = match payload {
                Value::String(s) => Some(s.clone()),
                other => str_field(other, "url"),
            };
            url.map(|url| Command::OpenUrl { url })
                .ok_or_else(|| malformed("openUrl: no url"))
        }
        "saveData" => {
            let object = match payload {
                Value::String(s) => serde_json::from_str::<Value>(s)
                    .map_err(|e| malformed(format!("saveData: {e}")))?,
                other => other.clone(),
            };
            if !object.is_object() {
                return Err(malformed("saveData: payload is not an object"));
            }
            Ok(Command::Save {
                key: str_field(&object, "key").unwrap_or_default(),
                value: str_field(&object, "value").unwrap_or_default(),
            })
        }
        "loadData" => {
            let key = match payload {
                Value::String(s) => Some(s.clone()),
                other => str_field(other, "key"),
            };
            key.map(|key| Command::Load { key })
                .ok_or_else(|| malformed("loadData: no key"))
        }
        other => Err(malformed(format!("unknown event {other:?}"))),
    }
}

impl Command {
    /// Normalize a message posted by content into a command.
    ///
    /// Accepts the bare resize string (`sairyne:resize:1`), a JSON string
    /// holding an envelope, and object envelopes in all their generations:
    /// `{type:'JUCE_DATA', command, payload}`, `{type:'save_data', payload}`,
    /// `{type:'sairyne_save_data', key, value}` and
    /// `{source:'sairyne', expanded}`.
    pub fn from_content_message(data: &Value) -> Result<Self> {
        match data {
            Value::String(text) => {
                if let Some(flag) = text.strip_prefix("sairyne:resize:") {
                    return Ok(Self::Resize {
                        expanded: flag == "1",
                    });
                }
                let parsed: Value = serde_json::from_str(text)
                    .map_err(|_| malformed("string message is neither resize nor JSON"))?;
                if parsed.is_string() {
                    return Err(malformed("nested string envelope"));
                }
                Self::from_content_message(&parsed)
            }
            Value::Object(object) => {
                if object.get("source").and_then(Value::as_str) == Some("sairyne") {
                    if let Some(flag) = object.get("expanded") {
                        return Ok(Self::Resize {
                            expanded: truthy(flag),
                        });
                    }
                }

                let ty = object
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("object message without type"))?;

                let (word, payload) = if ty == "JUCE_DATA" {
                    let word = object
                        .get("command")
                        .and_then(Value::as_str)
                        .ok_or_else(|| malformed("JUCE_DATA without command"))?;
                    (word, object.get("payload").unwrap_or(&Value::Null))
                } else if ty.starts_with("sairyne_") {
                    // Flat shape: fields live next to `type`.
                    (ty, data)
                } else {
                    (ty, object.get("payload").unwrap_or(&Value::Null))
                };

                Self::from_envelope(word, payload)
            }
            _ => Err(malformed("unsupported message shape")),
        }
    }

    /// Build a command from an envelope command word and its payload.
    pub fn from_envelope(word: &str, payload: &Value) -> Result<Self> {
        let kind = CommandKind::from_command_word(word)
            .ok_or_else(|| malformed(format!("unknown command {word:?}")))?;
        let field = |name: &str| {
            str_field(payload, name).ok_or_else(|| malformed(format!("{word}: missing {name}")))
        };
        match kind {
            CommandKind::Save => Ok(Self::Save {
                key: field("key")?,
                value: str_field(payload, "value").unwrap_or_default(),
            }),
            CommandKind::Load => Ok(Self::Load { key: field("key")? }),
            CommandKind::OpenUrl => Ok(Self::OpenUrl { url: field("url")? }),
            CommandKind::Debug => Ok(Self::Debug {
                message: field("message")?,
            }),
            CommandKind::Resize => Ok(Self::Resize {
                expanded: payload.get("expanded").is_some_and(truthy),
            }),
        }
    }
}
