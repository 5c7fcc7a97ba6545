//! L1: a process-local, bounded, TTL-aware LRU cache (spec §4.4).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::model::{Fingerprint, ValidationResult};

struct Entry {
    result: ValidationResult,
    policy_version: u64,
    inserted_at: Instant,
}

/// Process-local bounded associative cache with per-entry TTL and LRU
/// eviction (spec §4.4 "L1").
pub struct L1Cache {
    entries: Mutex<LruCache<Fingerprint, Entry>>,
    ttl: Duration,
}

impl L1Cache {
    /// Build an L1 cache with the given capacity (entry count) and TTL.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up `fingerprint`, returning `None` on a miss, an expired entry,
    /// or a `policy_version` mismatch (spec §4.4 "Staleness").
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn get(&self, fingerprint: &Fingerprint, current_policy_version: u64) -> Option<ValidationResult> {
        let mut entries = self.entries.lock().expect("l1 cache lock poisoned");
        let Some(entry) = entries.get(fingerprint) else {
            return None;
        };
        if entry.inserted_at.elapsed() > self.ttl || entry.policy_version != current_policy_version {
            entries.pop(fingerprint);
            return None;
        }
        Some(entry.result.clone())
    }

    /// Insert or replace an entry, tagged with the `policy_version` it was
    /// computed under (spec §4.4 "Staleness").
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn put(&self, fingerprint: Fingerprint, result: ValidationResult, policy_version: u64) {
        let mut entries = self.entries.lock().expect("l1 cache lock poisoned");
        entries.put(
            fingerprint,
            Entry {
                result,
                policy_version,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove `fingerprint` unconditionally.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        self.entries
            .lock()
            .expect("l1 cache lock poisoned")
            .pop(fingerprint);
    }
}
