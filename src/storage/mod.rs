//! Counter stores.
//!
//! The limiter only needs two operations from a backend: fetch the bytes
//! stored under a key and store bytes under a key with a time-to-live.
//! [`MemoryStore`] keeps everything in-process; [`ClusterStore`] shares
//! records between nodes over gossip.

mod cluster;
mod memory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

pub use cluster::{ClusterConfig, ClusterStore};
pub use memory::MemoryStore;

/// Backend failures. A missing key is not an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store is closed")]
    Closed,
}

/// Key/value storage for serialized counter records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the bytes stored under `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key` for `ttl`. A zero `ttl` never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }
}

/// Absolute expiry for a TTL, `0` meaning never.
pub(crate) fn expires_at(now: u32, ttl: Duration) -> u32 {
    if ttl.is_zero() {
        return 0;
    }
    let secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX).max(1);
    now.saturating_add(secs)
}

pub(crate) fn is_expired(expires_at: u32, now: u32) -> bool {
    expires_at != 0 && expires_at <= now
}

/// Run `sweep` every `interval` until `shutdown` flips or its sender drops.
///
/// Returns `None` when called outside a tokio runtime.
pub(crate) fn spawn_sweeper<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut sweep: F,
) -> Option<JoinHandle<()>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(store = name, "No tokio runtime, expired entries will not be swept");
            return None;
        }
    };

    Some(handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => sweep().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at() {
        assert_eq!(expires_at(100, Duration::ZERO), 0);
        assert_eq!(expires_at(100, Duration::from_secs(5)), 105);
        assert_eq!(expires_at(100, Duration::from_millis(300)), 101);
        assert_eq!(expires_at(u32::MAX - 1, Duration::from_secs(10)), u32::MAX);
    }

    #[test]
    fn test_is_expired() {
        assert!(!is_expired(0, u32::MAX));
        assert!(!is_expired(10, 9));
        assert!(is_expired(10, 10));
        assert!(is_expired(10, 11));
    }

    #[tokio::test]
    async fn test_arc_storage_delegates() {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        store.set("k", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_sweeper_needs_runtime() {
        let (_tx, rx) = watch::channel(false);
        let handle = spawn_sweeper("test", Duration::from_secs(1), rx, || async {});
        assert!(handle.is_none());
    }
}
