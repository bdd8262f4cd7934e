//! Loads and stores counter records through a [`Storage`] backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use super::identity::Redacted;
use super::pool::{PooledRecord, RecordPool};
use crate::error::{Result, SlidegateError};
use crate::storage::{Storage, StoreError};

/// Bridges pooled counter records and their serialized form in storage.
pub struct RecordManager {
    storage: Arc<dyn Storage>,
    pool: RecordPool,
    redact_keys: bool,
    timeout: Option<Duration>,
}

impl RecordManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            pool: RecordPool::new(),
            redact_keys: false,
            timeout: None,
        }
    }

    /// Print a placeholder instead of identity keys in errors and logs.
    pub fn with_redaction(mut self, redact_keys: bool) -> Self {
        self.redact_keys = redact_keys;
        self
    }

    /// Bound every storage call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn redacts_keys(&self) -> bool {
        self.redact_keys
    }

    /// Render `key` for diagnostics.
    pub fn display_key<'a>(&self, key: &'a str) -> Redacted<'a> {
        Redacted::new(key, self.redact_keys)
    }

    pub fn pool(&self) -> &RecordPool {
        &self.pool
    }

    /// Take a zeroed record from the pool.
    pub fn acquire(&self) -> PooledRecord {
        self.pool.acquire()
    }

    /// Zero `record` and return it to the pool.
    pub fn release(&self, record: PooledRecord) {
        self.pool.release(record);
    }

    /// Load the record for `key`, or a fresh zeroed record if none is stored.
    pub async fn get(&self, key: &str) -> Result<PooledRecord> {
        let raw = self
            .bounded(self.storage.get(key))
            .await
            .map_err(|source| self.storage_error("get", key, source))?;

        let mut record = self.acquire();
        let Some(bytes) = raw else {
            trace!(key = %self.display_key(key), "No stored record");
            return Ok(record);
        };

        if let Err(source) = record.decode_into(&bytes) {
            self.release(record);
            warn!(key = %self.display_key(key), error = %source, "Stored record is corrupt");
            return Err(SlidegateError::Codec {
                key: self.display_key(key).to_string(),
                source,
            });
        }
        Ok(record)
    }

    /// Store `record` under `key` for `ttl`. The record is always returned to
    /// the pool, whether or not the write succeeds.
    pub async fn set(&self, key: &str, record: PooledRecord, ttl: Duration) -> Result<()> {
        let bytes = record.encode();
        self.release(record);

        self.bounded(self.storage.set(key, &bytes, ttl))
            .await
            .map_err(|source| self.storage_error("set", key, source))
    }

    async fn bounded<T, F>(&self, op: F) -> std::result::Result<T, StoreError>
    where
        F: std::future::Future<Output = std::result::Result<T, StoreError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .unwrap_or(Err(StoreError::Timeout(limit))),
            None => op.await,
        }
    }

    fn storage_error(&self, op: &'static str, key: &str, source: StoreError) -> SlidegateError {
        SlidegateError::Storage {
            op,
            key: self.display_key(key).to_string(),
            source,
        }
    }
}

impl std::fmt::Debug for RecordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("pool", &self.pool)
            .field("redact_keys", &self.redact_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}
