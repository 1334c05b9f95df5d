//! Bridge configuration.
//!
//! Every field has a default matching the shipped plugin, so an empty (or
//! missing) `Bridge.toml` yields a working configuration.
//!
//! # Example
//!
//! ```ignore
//! use sairyne_core::BridgeConfig;
//!
//! let config = BridgeConfig::from_toml_str(r#"
//!     entry_url = "http://localhost:5173/embed-chat.html"
//!     dedup_ttl_ms = 5000
//!
//!     [store]
//!     debounce_ms = 500
//! "#)?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::keys::DEFAULT_PERSISTED_KEYS;

/// Application folder name under the user data directory.
pub const APP_DIR_NAME: &str = "Sairyne";

fn default_entry_url() -> String {
    "https://sairyne-ai.vercel.app/embed-chat.html".into()
}

fn default_host_scheme() -> String {
    "juce".into()
}

fn default_legacy_scheme() -> String {
    "sairyne".into()
}

fn default_frame_id() -> String {
    "sairyne_iframe".into()
}

fn default_persisted_keys() -> Vec<String> {
    DEFAULT_PERSISTED_KEYS.iter().map(|k| (*k).to_owned()).collect()
}

const fn default_dedup_ttl_ms() -> u64 {
    3000
}

const fn default_inject_attempts() -> u32 {
    10
}

const fn default_inject_interval_ms() -> u64 {
    200
}

const fn default_attach_attempts() -> u32 {
    40
}

const fn default_attach_interval_ms() -> u64 {
    150
}

const fn default_poll_interval_ms() -> u64 {
    100
}

const fn default_debounce_ms() -> u64 {
    2000
}

const fn default_flush_timeout_ms() -> u64 {
    500
}

// =========================================================================
// StoreConfig
// =========================================================================

/// Persistent store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Explicit backing file. Defaults to `<data dir>/Sairyne/Sairyne.settings`.
    pub path: Option<PathBuf>,
    /// Window within which `save_if_needed` coalesces writes.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound on a forced flush.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            debounce_ms: default_debounce_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Flush timeout as a [`Duration`].
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Resolve the backing file location.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join("Sairyne.settings"))
    }
}

// =========================================================================
// BridgeConfig
// =========================================================================

/// Configuration for the bridge session, router and content-side agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address of the application entry point. A load-start for an address
    /// with this prefix triggers the startup injection.
    #[serde(default = "default_entry_url")]
    pub entry_url: String,
    /// Scheme of host-consumed command URLs (`juce://save?...`).
    #[serde(default = "default_host_scheme")]
    pub host_scheme: String,
    /// Scheme of the legacy wrapper signals (`sairyne://expanded=1`).
    #[serde(default = "default_legacy_scheme")]
    pub legacy_scheme: String,
    /// DOM id of the frame that hosts the content application.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    /// Keys pushed into the content context at startup.
    #[serde(default = "default_persisted_keys")]
    pub persisted_keys: Vec<String>,
    /// How long an identical command is treated as a replay.
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    /// Attempts the injected script makes to find the content frame.
    #[serde(default = "default_inject_attempts")]
    pub inject_attempts: u32,
    /// Delay between injection attempts.
    #[serde(default = "default_inject_interval_ms")]
    pub inject_interval_ms: u64,
    /// Attempts the agent makes to find the bridge object.
    #[serde(default = "default_attach_attempts")]
    pub attach_attempts: u32,
    /// Delay between attach attempts.
    #[serde(default = "default_attach_interval_ms")]
    pub attach_interval_ms: u64,
    /// Interval at which the wrapper polls for `data_loaded` markers.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Directory for `Sairyne.log`. Defaults to `<data dir>/Sairyne`.
    pub log_dir: Option<PathBuf>,
    /// Persistent store settings.
    pub store: StoreConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            entry_url: default_entry_url(),
            host_scheme: default_host_scheme(),
            legacy_scheme: default_legacy_scheme(),
            frame_id: default_frame_id(),
            persisted_keys: default_persisted_keys(),
            dedup_ttl_ms: default_dedup_ttl_ms(),
            inject_attempts: default_inject_attempts(),
            inject_interval_ms: default_inject_interval_ms(),
            attach_attempts: default_attach_attempts(),
            attach_interval_ms: default_attach_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            log_dir: None,
            store: StoreConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> std::result::Result<Self, String> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("failed to read {}: {e}", path.display())),
        }
    }

    /// Validate the configuration contents.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (field, scheme) in [("host_scheme", &self.host_scheme), ("legacy_scheme", &self.legacy_scheme)] {
            let valid = !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid {
                return Err(format!("{field} must be a valid URL scheme, got {scheme:?}"));
            }
        }
        if self.host_scheme.eq_ignore_ascii_case(&self.legacy_scheme) {
            return Err("host_scheme and legacy_scheme must differ".into());
        }
        if self.entry_url.is_empty() {
            return Err("entry_url must not be empty".into());
        }
        if self.persisted_keys.iter().any(|k| k.is_empty()) {
            return Err("persisted_keys must not contain empty keys".into());
        }
        if self.inject_attempts == 0 || self.attach_attempts == 0 {
            return Err("retry budgets must allow at least one attempt".into());
        }
        Ok(())
    }

    /// Prefix of host-consumed command URLs, e.g. `juce://`.
    pub fn host_prefix(&self) -> String {
        format!("{}://", self.host_scheme)
    }

    /// Prefix of legacy wrapper URLs, e.g. `sairyne://`.
    pub fn legacy_prefix(&self) -> String {
        format!("{}://", self.legacy_scheme)
    }

    /// Dedup window as a [`Duration`].
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.dedup_ttl_ms)
    }

    /// Resolve the log directory.
    pub fn resolve_log_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.log_dir {
            return Some(dir.clone());
        }
        dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.host_prefix(), "juce://");
        assert_eq!(config.legacy_prefix(), "sairyne://");
        assert_eq!(config.persisted_keys.len(), 7);
        assert_eq!(config.inject_attempts, 10);
        assert_eq!(config.attach_attempts, 40);
        assert_eq!(config.store.debounce(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config.entry_url, default_entry_url());
        assert_eq!(config.dedup_ttl_ms, 3000);
        assert_eq!(config.store.flush_timeout_ms, 500);
    }

    #[test]
    fn test_partial_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            entry_url = "http://localhost:5173/embed-chat.html"
            persisted_keys = ["a", "b"]

            [store]
            path = "/tmp/sairyne-test.settings"
            debounce_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.entry_url, "http://localhost:5173/embed-chat.html");
        assert_eq!(config.persisted_keys, vec!["a", "b"]);
        assert_eq!(config.store.debounce_ms, 10);
        assert_eq!(config.store.flush_timeout_ms, 500);
        assert_eq!(
            config.store.resolve_path(),
            Some(PathBuf::from("/tmp/sairyne-test.settings"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let err = BridgeConfig::from_toml_str("host_scheme = \"ju ce\"").unwrap_err();
        assert!(err.contains("host_scheme"));
        let err = BridgeConfig::from_toml_str("host_scheme = \"sairyne\"").unwrap_err();
        assert!(err.contains("must differ"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = BridgeConfig::load(&dir.path().join("Bridge.toml")).unwrap();
        assert_eq!(config.frame_id, "sairyne_iframe");
    }
}
