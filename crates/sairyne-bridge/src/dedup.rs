//! Replay suppression for commands that arrive on more than one channel.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sairyne_core::{Command, CommandKind};

/// Slot a command competes for: its kind and target (the key of a save).
type Slot = (CommandKind, String);

#[derive(Debug)]
struct Seen {
    payload: String,
    at: Instant,
}

/// Most recent command per slot, with a fixed time-to-live.
///
/// Not a correctness mechanism: the store is idempotent on its own. This
/// only keeps a save that raced over two channels from being written and
/// logged twice. A command is a replay only if it matches the latest one
/// admitted for its slot, so `A, B, A` on one key admits all three.
#[derive(Debug)]
pub struct RecentMessages {
    ttl: Duration,
    seen: HashMap<Slot, Seen>,
}

impl RecentMessages {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Record `command` and return `true` unless it repeats the latest
    /// command for its slot within the TTL.
    pub fn admit(&mut self, command: &Command) -> bool {
        self.admit_at(command, Instant::now())
    }

    pub fn admit_at(&mut self, command: &Command, now: Instant) -> bool {
        let ttl = self.ttl;
        self.seen.retain(|_, seen| now.saturating_duration_since(seen.at) < ttl);

        let (kind, target, payload) = command.fingerprint();
        let slot = (kind, target.to_owned());
        if self.seen.get(&slot).is_some_and(|seen| seen.payload == payload) {
            return false;
        }
        self.seen.insert(
            slot,
            Seen {
                payload: payload.to_owned(),
                at: now,
            },
        );
        true
    }

    /// Drop `command` from the cache so a retry is processed.
    pub fn forget(&mut self, command: &Command) {
        let (kind, target, payload) = command.fingerprint();
        let slot = (kind, target.to_owned());
        if self.seen.get(&slot).is_some_and(|seen| seen.payload == payload) {
            self.seen.remove(&slot);
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(value: &str) -> Command {
        Command::Save {
            key: "k".into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_repeat_within_ttl_is_suppressed() {
        let mut recent = RecentMessages::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(recent.admit_at(&save("v"), t0));
        assert!(!recent.admit_at(&save("v"), t0 + Duration::from_secs(1)));
        assert!(recent.admit_at(&save("w"), t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_returning_to_earlier_value_is_admitted() {
        let mut recent = RecentMessages::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(recent.admit_at(&save("A"), t0));
        assert!(recent.admit_at(&save("B"), t0 + Duration::from_millis(100)));
        assert!(recent.admit_at(&save("A"), t0 + Duration::from_millis(200)));
        assert!(!recent.admit_at(&save("A"), t0 + Duration::from_millis(300)));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_forget_ignores_superseded_command() {
        let mut recent = RecentMessages::new(Duration::from_secs(3));
        assert!(recent.admit(&save("A")));
        assert!(recent.admit(&save("B")));
        recent.forget(&save("A"));
        assert!(!recent.admit(&save("B")));
    }

    #[test]
    fn test_entries_expire() {
        let mut recent = RecentMessages::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(recent.admit_at(&save("v"), t0));
        assert!(recent.admit_at(&save("v"), t0 + Duration::from_secs(3)));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_forget_allows_retry() {
        let mut recent = RecentMessages::new(Duration::from_secs(3));
        assert!(recent.admit(&save("v")));
        recent.forget(&save("v"));
        assert!(recent.is_empty());
        assert!(recent.admit(&save("v")));
    }
}
