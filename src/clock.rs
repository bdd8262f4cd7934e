//! Wall-clock abstraction used by the limiter and the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in whole seconds since the unix epoch.
///
/// Injected into the limiter and stores so tests can drive time by hand.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_secs(&self) -> u32;
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u32 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    pub fn set(&self, secs: u32) {
        self.now.store(secs, Ordering::SeqCst);
    }

    /// Move the clock forward, saturating at `u32::MAX`.
    pub fn advance(&self, secs: u32) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_add(secs))
            });
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}
