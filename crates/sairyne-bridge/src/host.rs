//! Host capabilities the bridge depends on.
//!
//! The bridge never talks to a browser component directly. The embedding
//! editor implements [`ScriptEvaluator`] on top of its web view and hands it
//! to a [`ContentHandle`]; URL launching goes through [`UrlLauncher`].

use std::sync::{Arc, RwLock};

use sairyne_core::{BridgeError, Result};

/// Evaluates a script in the content context.
///
/// Called on the host's message thread. Implementations return
/// [`BridgeError::MissingEndpoint`] when no view is attached.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, script: &str) -> Result<()>;
}

/// Opens a URL outside the plugin (usually in the system browser).
pub trait UrlLauncher: Send + Sync {
    fn launch(&self, url: &str) -> std::io::Result<()>;
}

// =========================================================================
// ContentHandle
// =========================================================================

/// Shared handle for pushing scripts into the content context.
///
/// The handle is `Send + Sync` and cheap to clone. It starts detached;
/// [`attach`](Self::attach) is called once the editor's view exists and
/// [`invalidate`](Self::invalidate) when the view goes away. While detached,
/// [`evaluate`](Self::evaluate) fails with [`BridgeError::MissingEndpoint`].
#[derive(Clone, Default)]
pub struct ContentHandle {
    evaluator: Arc<RwLock<Option<Arc<dyn ScriptEvaluator>>>>,
}

impl ContentHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the view's evaluator.
    pub fn attach(&self, evaluator: Arc<dyn ScriptEvaluator>) {
        *self.evaluator.write().unwrap_or_else(|p| p.into_inner()) = Some(evaluator);
    }

    /// Detach the view. Later evaluations fail with `MissingEndpoint`.
    pub fn invalidate(&self) {
        *self.evaluator.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.evaluator
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Evaluate `script` in the content context.
    pub fn evaluate(&self, script: &str) -> Result<()> {
        let evaluator = self
            .evaluator
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(BridgeError::MissingEndpoint)?;
        evaluator.evaluate(script)
    }
}

impl std::fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// =========================================================================
// SystemBrowser
// =========================================================================

/// Launches URLs with the platform's opener. Does not wait for it to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl UrlLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        #[cfg(target_os = "macos")]
        let mut command = {
            let mut c = std::process::Command::new("open");
            c.arg(url);
            c
        };

        #[cfg(target_os = "windows")]
        let mut command = {
            let mut c = std::process::Command::new("cmd");
            // Empty title argument so a quoted URL is not taken as the title.
            c.args(["/C", "start", ""]).arg(url);
            c
        };

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let mut command = {
            let mut c = std::process::Command::new("xdg-open");
            c.arg(url);
            c
        };

        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ScriptEvaluator for Recorder {
        fn evaluate(&self, script: &str) -> Result<()> {
            self.0.lock().unwrap().push(script.to_owned());
            Ok(())
        }
    }

    #[test]
    fn test_detached_handle_reports_missing_endpoint() {
        let handle = ContentHandle::new();
        assert!(!handle.is_attached());
        assert!(matches!(handle.evaluate("1"), Err(BridgeError::MissingEndpoint)));
    }

    #[test]
    fn test_attach_then_invalidate() {
        let handle = ContentHandle::new();
        let recorder = Arc::new(Recorder::default());
        handle.attach(recorder.clone());

        let clone = handle.clone();
        clone.evaluate("window.x = 1").unwrap();
        assert_eq!(recorder.0.lock().unwrap().as_slice(), ["window.x = 1"]);

        handle.invalidate();
        assert!(!clone.is_attached());
        assert!(clone.evaluate("window.x = 2").is_err());
    }
}
