//! Soft accounting of live plugin instances.
//!
//! Several instances in one process share the store and log file. The
//! registry is advisory: it lets the first instance own startup chores such
//! as log truncation. It is owned by whoever owns the shared process state
//! and handed to each instance; nothing here is global.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts the instances currently holding an [`InstanceGuard`].
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    live: AtomicUsize,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one live instance for as long as the guard is held.
    pub fn acquire(self: &Arc<Self>) -> InstanceGuard {
        let before = self.live.fetch_add(1, Ordering::AcqRel);
        log::info!("Instance created (live: {})", before + 1);
        InstanceGuard {
            registry: Arc::clone(self),
            primary: before == 0,
        }
    }

    /// Number of live instances right now.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// One registered instance.
#[derive(Debug)]
pub struct InstanceGuard {
    registry: Arc<InstanceRegistry>,
    primary: bool,
}

impl InstanceGuard {
    /// Whether no other instance was live when this one was acquired.
    pub fn is_primary(&self) -> bool {
        self.primary
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let before = self.registry.live.fetch_sub(1, Ordering::AcqRel);
        log::info!("Instance destroyed (live: {})", before.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_live_instances() {
        let registry = Arc::new(InstanceRegistry::new());
        let a = registry.acquire();
        let b = registry.acquire();
        assert_eq!(registry.live_count(), 2);
        assert!(a.is_primary());
        assert!(!b.is_primary());

        drop(a);
        assert_eq!(registry.live_count(), 1);
        drop(b);
        assert_eq!(registry.live_count(), 0);

        // A fresh instance after everyone left is primary again.
        assert!(registry.acquire().is_primary());
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Arc::new(InstanceRegistry::new());
        let second = Arc::new(InstanceRegistry::new());
        let _a = first.acquire();
        assert!(second.acquire().is_primary());
        assert_eq!(second.live_count(), 0);
    }
}
