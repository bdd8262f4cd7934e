//! Reusable counter records for the admission hot path.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use super::record::CounterRecord;

/// Default number of idle records kept around.
const DEFAULT_CAPACITY: usize = 1024;

/// A bounded free list of zeroed counter records.
///
/// Cloning is cheap; all clones share the same free list.
#[derive(Clone)]
pub struct RecordPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<Box<CounterRecord>>>,
    capacity: usize,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a pool that keeps at most `capacity` idle records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(capacity.min(DEFAULT_CAPACITY))),
                capacity,
            }),
        }
    }

    /// Take a zeroed record, allocating only when the free list is empty.
    pub fn acquire(&self) -> PooledRecord {
        let record = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(CounterRecord::default()));

        PooledRecord {
            record: Some(record),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Return a record to the pool. Equivalent to dropping it.
    pub fn release(&self, record: PooledRecord) {
        drop(record);
    }

    /// Number of records currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPool")
            .field("idle", &self.idle())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// A counter record on loan from a [`RecordPool`].
///
/// The record is zeroed and handed back when this guard drops, so every
/// exit path (errors, cancelled futures) returns it.
pub struct PooledRecord {
    record: Option<Box<CounterRecord>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledRecord {
    type Target = CounterRecord;

    fn deref(&self) -> &CounterRecord {
        // Only `None` during drop.
        self.record.as_deref().unwrap_or(&EMPTY)
    }
}

impl DerefMut for PooledRecord {
    fn deref_mut(&mut self) -> &mut CounterRecord {
        self.record
            .get_or_insert_with(|| Box::new(CounterRecord::default()))
    }
}

static EMPTY: CounterRecord = CounterRecord {
    current_hits: 0,
    previous_hits: 0,
    expiry: 0,
};

impl Drop for PooledRecord {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.reset();
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.capacity {
                free.push(record);
            }
        }
    }
}

impl std::fmt::Debug for PooledRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&**self, f)
    }
}
