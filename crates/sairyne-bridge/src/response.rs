//! Host-to-content deliveries.
//!
//! Two messages flow from the host into the content context:
//! `juce_data_loaded` (answer to a load) and `juce_init` (persisted state
//! pushed at startup). Both are delivered by evaluating a script in the
//! wrapper page, which forwards them into the content frame. When no script
//! endpoint exists, a load answer is published as a numbered `data_loaded`
//! marker URL that the wrapper polls instead.

use sairyne_core::{BridgeConfig, PropertyStore};
use sairyne_utils::{encode_for_transport, escape_js_single_quoted, escape_json_string, query_param};

/// Path of the load-answer marker on the legacy scheme.
const DATA_LOADED: &str = "data_loaded";

/// How a load answer reached (or will reach) the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Evaluated as a script in the content context.
    Script,
    /// Published as a marker URL for the wrapper to poll.
    Marker(String),
}

/// Persisted entries of `keys` that have a non-empty value, in key order.
pub fn init_entries(store: &PropertyStore, keys: &[String]) -> Vec<(String, String)> {
    keys.iter()
        .filter_map(|key| {
            let value = store.get(key, "");
            (!value.is_empty()).then(|| (key.clone(), value))
        })
        .collect()
}

/// `{"type":"juce_init","data":{...}}`, built by hand so key order follows
/// the configured key list.
pub fn init_message_json(entries: &[(String, String)]) -> String {
    let mut json = String::from("{\"type\":\"juce_init\",\"data\":{");
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            json.push(',');
        }
        json.push('"');
        json.push_str(&escape_json_string(key));
        json.push_str("\":\"");
        json.push_str(&escape_json_string(value));
        json.push('"');
    }
    json.push_str("}}");
    json
}

/// Script that posts the `juce_init` message into the content frame.
///
/// The frame may not exist yet, so the script retries on its own timer and
/// then gives up silently.
pub fn init_script(entries: &[(String, String)], config: &BridgeConfig) -> String {
    format!(
        "(function(){{\
var m={message};\
var n=0;\
function post(){{\
var f=document.getElementById('{frame}');\
if(f&&f.contentWindow){{f.contentWindow.postMessage(m,'*');return;}}\
if(++n<{attempts}){{setTimeout(post,{interval});}}\
}}\
post();\
if(typeof window.onJuceInit==='function'){{try{{window.onJuceInit(m.data);}}catch(_){{}}}}\
}})();",
        message = init_message_json(entries),
        frame = escape_js_single_quoted(&config.frame_id),
        attempts = config.inject_attempts,
        interval = config.inject_interval_ms,
    )
}

/// Script that answers a load. An empty `value` is an explicit miss.
pub fn load_response_script(key: &str, value: &str, config: &BridgeConfig) -> String {
    format!(
        "(function(){{\
var k='{key}',v='{value}';\
var f=document.getElementById('{frame}');\
if(f&&f.contentWindow){{f.contentWindow.postMessage({{type:'juce_data_loaded',key:k,value:v}},'*');}}\
if(typeof window.onJuceDataLoaded==='function'){{try{{window.onJuceDataLoaded(k,v);}}catch(_){{}}}}\
}})();",
        key = escape_js_single_quoted(key),
        value = escape_js_single_quoted(value),
        frame = escape_js_single_quoted(&config.frame_id),
    )
}

/// `sairyne://data_loaded?key=K&value=V&seq=N`
///
/// `seq` only makes each published answer unique; a poller that skips the
/// marker it saw last still sees a repeated answer to a repeated load.
pub fn data_loaded_marker(key: &str, value: &str, seq: u64, config: &BridgeConfig) -> String {
    format!(
        "{}{DATA_LOADED}?key={}&value={}&seq={seq}",
        config.legacy_prefix(),
        encode_for_transport(key),
        encode_for_transport(value)
    )
}

/// Parse a marker produced by [`data_loaded_marker`] back into `(key, value)`.
pub fn parse_data_loaded_marker(url: &str, config: &BridgeConfig) -> Option<(String, String)> {
    let rest = url.strip_prefix(&config.legacy_prefix())?;
    let query = rest.strip_prefix(DATA_LOADED)?.strip_prefix('?')?;
    let key = query_param(query, "key")?;
    let value = query_param(query, "value").unwrap_or_default();
    Some((key, value))
}
