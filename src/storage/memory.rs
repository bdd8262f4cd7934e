//! In-process counter store with background expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{expires_at, is_expired, spawn_sweeper, Storage, StoreError};
use crate::clock::{Clock, SystemClock};

/// Default interval between expiry sweeps.
const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(1);

struct Entry {
    value: Vec<u8>,
    /// Absolute expiry in unix seconds, `0` = never
    expires_at: u32,
}

struct Shared {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let candidates = self.expired_keys(now);
        if candidates.is_empty() {
            return 0;
        }
        self.remove_expired(candidates, now)
    }

    /// Keys expired at `now`, found under the read lock.
    fn expired_keys(&self, now: u32) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| is_expired(e.expires_at, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Remove the candidates that are still expired under the write lock.
    fn remove_expired(&self, candidates: Vec<String>, now: u32) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in candidates {
            // The entry may have been refreshed between the scan and now.
            let still_expired = entries
                .get(&key)
                .map(|e| is_expired(e.expires_at, now))
                .unwrap_or(false);
            if still_expired {
                entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

/// A key/value store held in process memory.
///
/// Reads share a read lock; writes and the expiry sweep take the write lock.
/// A background task purges expired entries until [`MemoryStore::close`] is
/// called or the store is dropped.
pub struct MemoryStore {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store using the system clock and a one second sweep.
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_GC_INTERVAL, Arc::new(SystemClock))
    }

    /// Create a store with a custom sweep interval.
    pub fn with_gc_interval(gc_interval: Duration) -> Self {
        Self::with_clock(gc_interval, Arc::new(SystemClock))
    }

    /// Create a store with a custom sweep interval and clock.
    pub fn with_clock(gc_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            clock,
        });
        let (shutdown, rx) = watch::channel(false);

        let weak = Arc::downgrade(&shared);
        let sweeper = spawn_sweeper("memory", gc_interval, rx, move || {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    let removed = shared.purge_expired();
                    if removed > 0 {
                        debug!(removed = removed, "Purged expired entries");
                    }
                }
            }
        });

        Self {
            shared,
            shutdown,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.shared.entries.write().remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry now and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Stop the background sweep. Stored entries stay readable.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        debug!("Memory store sweeper stopped");
    }

    /// Whether a background sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.shared.clock.now_secs();
        let entries = self.shared.entries.read();

        match entries.get(key) {
            Some(entry) if !is_expired(entry.expires_at, now) => Ok(Some(entry.value.clone())),
            _ => {
                trace!("Memory store miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expires_at(self.shared.clock.now_secs(), ttl);
        let entry = Entry {
            value: value.to_vec(),
            expires_at,
        };

        self.shared.entries.write().insert(key.to_string(), entry);
        Ok(())
    }
}
