//! Error types for bridge and store operations.
//!
//! None of these ever reach the content context or a dialog. The router
//! logs them at the boundary and carries on; the content side re-issues
//! commands on its own timers.

use std::time::Duration;

/// Errors raised while moving a command across the bridge.
#[derive(Debug)]
pub enum BridgeError {
    /// The message could not be parsed into a known command shape.
    MalformedMessage(String),
    /// No receiving endpoint is attached yet (bridge object, frame, view).
    MissingEndpoint,
    /// The backing store could not be read or written.
    StoreUnavailable(StoreError),
    /// A value read back after a flush differs from the value written.
    VerificationMismatch {
        key: String,
        expected_len: usize,
        actual_len: usize,
    },
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMessage(msg) => write!(f, "malformed message: {msg}"),
            Self::MissingEndpoint => write!(f, "no receiving endpoint attached"),
            Self::StoreUnavailable(err) => write!(f, "store unavailable: {err}"),
            Self::VerificationMismatch {
                key,
                expected_len,
                actual_len,
            } => write!(
                f,
                "read-back mismatch for {key}: wrote {expected_len} bytes, read {actual_len}"
            ),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}

/// Errors from the persistent store's backing file.
#[derive(Debug)]
pub enum StoreError {
    /// Reading, writing or renaming the backing file failed.
    Io(std::io::Error),
    /// The backing file exists but is not a JSON object of strings.
    Corrupt(serde_json::Error),
    /// The writer did not finish within the flush timeout.
    FlushTimeout(Duration),
    /// No backing location could be determined.
    NoLocation,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "i/o error: {err}"),
            Self::Corrupt(err) => write!(f, "corrupt store file: {err}"),
            Self::FlushTimeout(timeout) => {
                write!(f, "flush did not complete within {} ms", timeout.as_millis())
            }
            Self::NoLocation => write!(f, "no user data directory available"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Corrupt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err)
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
