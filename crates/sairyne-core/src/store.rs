//! Durable key/value store backing the bridge.
//!
//! [`PropertyStore`] keeps every entry in memory and mirrors it to a JSON
//! file. Writes are coalesced: [`PropertyStore::save_if_needed`] only touches
//! the disk once the debounce window since the last write has passed, while
//! [`PropertyStore::flush`] forces a write bounded by the flush timeout.
//!
//! [`StoreCell`] opens the store lazily, once, and hands out shared handles.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::StoreConfig;
use crate::error::StoreError;

type Entries = BTreeMap<String, String>;

/// In-memory state guarded by the store mutex.
#[derive(Debug, Default)]
struct StoreState {
    entries: Entries,
    /// Bumped on every mutation; a flush only clears `dirty` if no
    /// mutation happened after its snapshot.
    revision: u64,
    dirty: bool,
    last_write: Option<Instant>,
}

/// Serializes writers on the backing file and drops stale snapshots.
#[derive(Debug, Default)]
struct FileGate {
    lock: Mutex<()>,
    /// Revision of the newest snapshot that reached the disk.
    written_revision: AtomicU64,
    /// Number of completed writes, for diagnostics.
    writes: AtomicU64,
}

/// Durable string-to-string map.
#[derive(Debug)]
pub struct PropertyStore {
    path: PathBuf,
    debounce: Duration,
    flush_timeout: Duration,
    state: Mutex<StoreState>,
    gate: Arc<FileGate>,
}

impl PropertyStore {
    /// Open the store described by `config`, loading any existing file.
    ///
    /// A file that exists but cannot be parsed is moved aside to
    /// `<name>.corrupt` and the store starts empty.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let path = config.resolve_path().ok_or(StoreError::NoLocation)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(StoreError::Corrupt(err)) => {
                let aside = sibling(&path, "corrupt");
                log::warn!(
                    "Store file {} is corrupt ({err}); moving it to {}",
                    path.display(),
                    aside.display()
                );
                if let Err(e) = fs::rename(&path, &aside) {
                    log::warn!("Failed to move corrupt store aside: {e}");
                }
                Entries::new()
            }
            Err(err) => return Err(err),
        };

        log::info!("Store opened: {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            debounce: config.debounce(),
            flush_timeout: config.flush_timeout(),
            state: Mutex::new(StoreState {
                entries,
                ..StoreState::default()
            }),
            gate: Arc::new(FileGate::default()),
        })
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        // A panic while holding the lock cannot leave a torn entry: every
        // mutation is a single map operation.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set `key` to `value`. Setting the current value is a no-op.
    pub fn set(&self, key: &str, value: &str) {
        let mut state = self.state();
        if state.entries.get(key).is_some_and(|current| current == value) {
            return;
        }
        state.entries.insert(key.to_owned(), value.to_owned());
        state.revision += 1;
        state.dirty = true;
    }

    /// Value stored under `key`, or `default` when absent.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.state()
            .entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }

    /// Whether `key` has a stored value.
    pub fn contains(&self, key: &str) -> bool {
        self.state().entries.contains_key(key)
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut state = self.state();
        let previous = state.entries.remove(key);
        if previous.is_some() {
            state.revision += 1;
            state.dirty = true;
        }
        previous
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.state().entries.keys().cloned().collect()
    }

    /// Whether there are changes not yet written to disk.
    pub fn needs_writing(&self) -> bool {
        self.state().dirty
    }

    /// Number of completed writes to the backing file since open.
    pub fn write_count(&self) -> u64 {
        self.gate.writes.load(Ordering::Acquire)
    }

    /// Write pending changes unless the last write was within the debounce
    /// window. Returns whether a write happened.
    pub fn save_if_needed(&self) -> Result<bool, StoreError> {
        {
            let state = self.state();
            if !state.dirty {
                return Ok(false);
            }
            if state.last_write.is_some_and(|at| at.elapsed() < self.debounce) {
                return Ok(false);
            }
        }
        self.flush()
    }

    /// Force pending changes to disk, waiting at most the flush timeout.
    ///
    /// Returns whether a write happened. On [`StoreError::FlushTimeout`] the
    /// write keeps running in the background and the store stays dirty, so
    /// the next flush writes again.
    pub fn flush(&self) -> Result<bool, StoreError> {
        let (snapshot, revision) = {
            let state = self.state();
            if !state.dirty {
                return Ok(false);
            }
            (serde_json::to_string_pretty(&state.entries)?, state.revision)
        };

        let (tx, rx) = mpsc::channel();
        let gate = Arc::clone(&self.gate);
        let path = self.path.clone();
        std::thread::Builder::new()
            .name("sairyne-store-writer".into())
            .spawn(move || {
                let _ = tx.send(write_snapshot(&gate, &path, &snapshot, revision));
            })?;

        match rx.recv_timeout(self.flush_timeout) {
            Ok(Ok(())) => {
                let mut state = self.state();
                state.last_write = Some(Instant::now());
                if state.revision == revision {
                    state.dirty = false;
                }
                Ok(true)
            }
            Ok(Err(err)) => Err(err),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(StoreError::FlushTimeout(self.flush_timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store writer exited without reporting",
            ))),
        }
    }

    /// Read `key` from the backing file, bypassing the in-memory map.
    ///
    /// Used to verify that a flushed value actually reached the disk.
    pub fn durable_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.gate.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(read_entries(&self.path)?.remove(key))
    }
}

impl Drop for PropertyStore {
    fn drop(&mut self) {
        if self.needs_writing() {
            if let Err(e) = self.flush() {
                log::warn!("Failed to write store on close: {e}");
            }
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn read_entries(path: &Path) -> Result<Entries, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Entries::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write a snapshot atomically: temp file, fsync, rename.
fn write_snapshot(gate: &FileGate, path: &Path, snapshot: &str, revision: u64) -> Result<(), StoreError> {
    let _guard = gate.lock.lock().unwrap_or_else(|p| p.into_inner());

    // A newer snapshot already landed (an earlier flush timed out and this
    // writer ran late).
    if gate.written_revision.load(Ordering::Acquire) > revision {
        return Ok(());
    }

    let tmp = sibling(path, "tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(snapshot.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    gate.written_revision.store(revision, Ordering::Release);
    gate.writes.fetch_add(1, Ordering::AcqRel);
    Ok(())
}

// =========================================================================
// StoreCell
// =========================================================================

/// Lazily opened, memoized store handle.
///
/// The first successful [`StoreCell::get`] opens the store; later calls
/// return the same handle. A failed open is not memoized, so a medium that
/// becomes writable later is picked up on the next access.
#[derive(Debug)]
pub struct StoreCell {
    config: StoreConfig,
    store: Mutex<Option<Arc<PropertyStore>>>,
}

impl StoreCell {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: Mutex::new(None),
        }
    }

    /// Open (once) and return the shared store handle.
    pub fn get(&self) -> Result<Arc<PropertyStore>, StoreError> {
        let mut slot = self.store.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(PropertyStore::open(&self.config)?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Whether the store has been opened.
    pub fn is_open(&self) -> bool {
        self.store.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Flush the open store, if any, keeping the handle.
    pub fn flush(&self) {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(store) = store {
            if let Err(e) = store.flush() {
                log::warn!("Failed to flush store: {e}");
            }
        }
    }

    /// Flush and release the handle held by the cell.
    pub fn close(&self) {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(store) = store {
            if let Err(e) = store.flush() {
                log::warn!("Failed to flush store on close: {e}");
            }
        }
    }
}
