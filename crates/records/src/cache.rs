//! In-memory cache for record payloads

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, trace};

const SIZE_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe cache of serialized record payloads keyed by global key
///
/// Caches values after their first read. Records are immutable, so a second
/// insert for the same key must carry the same payload; a differing payload
/// means the underlying files changed while mapped and is logged as an error
/// (the first value wins).
pub struct RecordCache {
    entries: DashMap<u64, Bytes>,
    cached_bytes: AtomicU64,
    last_size_log: Mutex<Instant>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            cached_bytes: AtomicU64::new(0),
            last_size_log: Mutex::new(Instant::now()),
        }
    }

    /// Look up a cached payload
    pub fn lookup(&self, key: u64) -> Option<Bytes> {
        self.entries.get(&key).map(|entry| entry.clone())
    }

    /// Insert a payload read from disk
    pub fn insert(&self, key: u64, value: Bytes) {
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                // Concurrent readers may race on the same key before it is
                // cached.
                if existing.get() != &value {
                    error!(
                        key,
                        "record already cached with a different payload; keeping the first value"
                    );
                } else {
                    trace!(key, "record already cached");
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let total = self
                    .cached_bytes
                    .fetch_add(value.len() as u64, Ordering::Relaxed)
                    + value.len() as u64;
                slot.insert(value);
                self.maybe_log_size(total);
            }
        }
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes held by the cache
    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes.load(Ordering::Relaxed)
    }

    fn maybe_log_size(&self, total_bytes: u64) {
        let mut last = self.last_size_log.lock();
        if last.elapsed() >= SIZE_LOG_INTERVAL {
            *last = Instant::now();
            info!(
                bytes = total_bytes,
                records = self.entries.len(),
                "Record cache size"
            );
        }
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("records", &self.entries.len())
            .field("cached_bytes", &self.cached_bytes())
            .finish()
    }
}
