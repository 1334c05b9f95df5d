//! Scripts and pages shipped inside the plugin binary.
//!
//! Both files are templates: `__SAIRYNE_*__` placeholders are filled from
//! [`BridgeConfig`] when the host serves or injects them, so the retry
//! constants in the browser always match the ones the host was built with.

use sairyne_core::BridgeConfig;
use sairyne_utils::escape_js_single_quoted;

/// A single file embedded at compile time.
#[derive(Debug)]
pub struct EmbeddedAsset {
    /// Name the host serves the file under.
    pub path: &'static str,
    /// Template source.
    pub template: &'static str,
}

/// Content-side agent, injected after every page load.
pub const AGENT_JS: EmbeddedAsset = EmbeddedAsset {
    path: "agent.js",
    template: include_str!("../assets/agent.js"),
};

/// Wrapper page hosting the content frame.
pub const WRAPPER_HTML: EmbeddedAsset = EmbeddedAsset {
    path: "wrapper.html",
    template: include_str!("../assets/wrapper.html"),
};

/// Render the asset served under `path`.
pub fn render(path: &str, config: &BridgeConfig) -> Option<String> {
    match path {
        p if p == AGENT_JS.path => Some(agent_script(config)),
        p if p == WRAPPER_HTML.path => Some(wrapper_html(config)),
        _ => None,
    }
}

fn fill(template: &str, pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .fold(template.to_owned(), |text, (placeholder, value)| text.replace(placeholder, value))
}

fn escape_html_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// The agent script with its constants filled in.
pub fn agent_script(config: &BridgeConfig) -> String {
    fill(
        AGENT_JS.template,
        &[
            ("__SAIRYNE_ATTACH_ATTEMPTS__", config.attach_attempts.to_string()),
            ("__SAIRYNE_ATTACH_INTERVAL_MS__", config.attach_interval_ms.to_string()),
            ("__SAIRYNE_POLL_INTERVAL_MS__", config.poll_interval_ms.to_string()),
            ("__SAIRYNE_HOST_SCHEME__", escape_js_single_quoted(&config.host_scheme)),
            ("__SAIRYNE_LEGACY_SCHEME__", escape_js_single_quoted(&config.legacy_scheme)),
        ],
    )
}

/// The wrapper page pointing its frame at the configured entry point.
pub fn wrapper_html(config: &BridgeConfig) -> String {
    fill(
        WRAPPER_HTML.template,
        &[
            ("__SAIRYNE_FRAME_JS_ID__", escape_js_single_quoted(&config.frame_id)),
            ("__SAIRYNE_FRAME_ID__", escape_html_attr(&config.frame_id)),
            ("__SAIRYNE_ENTRY_URL__", escape_html_attr(&config.entry_url)),
            ("__SAIRYNE_ATTACH_ATTEMPTS__", config.attach_attempts.to_string()),
            ("__SAIRYNE_ATTACH_INTERVAL_MS__", config.attach_interval_ms.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_placeholders_filled() {
        let script = agent_script(&BridgeConfig::default());
        assert!(!script.contains("__SAIRYNE_"));
        assert!(script.contains("var ATTACH_ATTEMPTS = 40;"));
        assert!(script.contains("var ATTACH_INTERVAL_MS = 150;"));
        assert!(script.contains("var HOST_PREFIX = 'juce://';"));
    }

    #[test]
    fn test_agent_wraps_messaging_primitives() {
        let script = agent_script(&BridgeConfig::default());
        assert!(script.contains("wrap(window, 'postMessage');"));
        assert!(script.contains("wrap(window.juce, 'postMessage');"));
        assert!(script.contains("wrap(window.webkit.messageHandlers.juce, 'postMessage');"));
    }

    #[test]
    fn test_wrapper_escapes_entry_url() {
        let config = BridgeConfig {
            entry_url: "https://example.com/embed?a=1&b=\"2\"".into(),
            ..BridgeConfig::default()
        };
        let html = wrapper_html(&config);
        assert!(!html.contains("__SAIRYNE_"));
        assert!(html.contains("src=\"https://example.com/embed?a=1&amp;b=&quot;2&quot;\""));
        assert!(html.contains("id=\"sairyne_iframe\""));
    }

    #[test]
    fn test_render_by_path() {
        let config = BridgeConfig::default();
        assert!(render("agent.js", &config).is_some());
        assert!(render("wrapper.html", &config).is_some());
        assert!(render("index.html", &config).is_none());
    }
}
