//! File-backed diagnostics.
//!
//! The crate logs through the `log` facade. The first [`LogContext`] installs
//! a `tracing-subscriber` registry for the process: an stderr layer, a
//! reloadable file layer and an env filter (`SAIRYNE_LOG`, default `info`).
//! `log` records reach it through the subscriber's `log` bridge.
//!
//! A context truncates `Sairyne.log` and swaps it into the file layer.
//! Dropping the context swaps the file back out, unless a newer context has
//! taken over since.
//!
//! If the host already installed a global subscriber, that one stays in
//! place and no file is attached.

use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing_subscriber::fmt::{self, format::DefaultFields, format::Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::BridgeConfig;

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "Sairyne.log";

/// Environment variable holding the filter directives.
pub const LOG_FILTER_ENV: &str = "SAIRYNE_LOG";

/// Default cap for value previews in log lines.
pub const PREVIEW_CHARS: usize = 200;

type FileLayer = Option<fmt::Layer<Registry, DefaultFields, Format, Arc<File>>>;

/// Handle on the installed subscriber's file layer.
struct Backend {
    file: reload::Handle<FileLayer, Registry>,
    /// Context currently writing the file.
    owner: Mutex<Option<u64>>,
    next_owner: AtomicU64,
}

// The global subscriber can be set once per process; this remembers whether
// it was ours.
static BACKEND: OnceLock<Option<Backend>> = OnceLock::new();

fn backend() -> Option<&'static Backend> {
    BACKEND
        .get_or_init(|| {
            let (file_layer, file) = reload::Layer::new(FileLayer::None);
            let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
            let installed = tracing_subscriber::registry()
                .with(file_layer)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(filter)
                .try_init();
            match installed {
                Ok(()) => Some(Backend {
                    file,
                    owner: Mutex::new(None),
                    next_owner: AtomicU64::new(1),
                }),
                Err(e) => {
                    eprintln!("sairyne: keeping the host's subscriber ({e})");
                    None
                }
            }
        })
        .as_ref()
}

/// Owns the log file attachment for one plugin instance.
#[derive(Debug)]
pub struct LogContext {
    owner: Option<u64>,
    path: Option<PathBuf>,
}

impl LogContext {
    /// Install the subscriber (once) and attach `<log dir>/Sairyne.log`.
    ///
    /// Failure to open the file is reported on stderr and otherwise ignored.
    pub fn init(config: &BridgeConfig) -> Self {
        let detached = Self { owner: None, path: None };
        let Some(backend) = backend() else {
            return detached;
        };
        let Some(path) = config.resolve_log_dir().map(|dir| dir.join(LOG_FILE_NAME)) else {
            return detached;
        };

        let mut file = match open_truncated(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("sairyne: cannot open {}: {e}", path.display());
                return detached;
            }
        };
        // The header goes in before the swap so it is always the first line.
        let _ = writeln!(file, "Sairyne log {}", path.display());

        let owner = backend.next_owner.fetch_add(1, Ordering::Relaxed);
        let layer: FileLayer = Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)));
        if let Err(e) = backend.file.reload(layer) {
            eprintln!("sairyne: cannot attach {}: {e}", path.display());
            return detached;
        }
        *backend.owner.lock().unwrap_or_else(|p| p.into_inner()) = Some(owner);

        log::info!("Logging to {}", path.display());
        Self {
            owner: Some(owner),
            path: Some(path),
        }
    }

    /// The attached log file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether this context's file is still the one being written.
    pub fn is_attached(&self) -> bool {
        let Some(backend) = backend() else {
            return false;
        };
        self.owner.is_some() && *backend.owner.lock().unwrap_or_else(|p| p.into_inner()) == self.owner
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        let (Some(owner), Some(backend)) = (self.owner, BACKEND.get().and_then(Option::as_ref)) else {
            return;
        };
        let mut current = backend.owner.lock().unwrap_or_else(|p| p.into_inner());
        if *current == Some(owner) {
            let _ = backend.file.reload(FileLayer::None);
            *current = None;
        }
    }
}

fn open_truncated(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// Shorten `text` to at most `max_chars` characters for a log line.
pub fn preview(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}... ({} bytes)", &text[..cut], text.len())),
        None => Cow::Borrowed(text),
    }
}
