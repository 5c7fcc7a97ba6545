//! The two-tier result cache (spec §4.4).
//!
//! [`TwoTierCache`] composes an [`L1Cache`] (process-local, bounded, LRU)
//! and an [`L2Backend`] (shared, externally managed) behind the
//! [`ResultCache`] trait the pipeline depends on. It enforces the spec's
//! safety invariant itself — callers cannot accidentally cache an unsafe
//! verdict, because [`TwoTierCache::put`] silently refuses one.

pub mod l1;
pub mod l2;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::model::{Fingerprint, ValidationResult};

pub use l1::L1Cache;
pub use l2::{InMemoryL2, L2Backend, L2Error};

/// The cache key: a prompt fingerprint (spec §3, §4.4).
pub type CacheKey = Fingerprint;

/// The pipeline-facing cache contract.
///
/// Implementations must never let a read/write failure escape as an
/// error — spec §4.4 "Failure semantics" requires cache errors to
/// downgrade silently to a miss.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up `key` under the policy currently at `policy_version`.
    /// Returns `None` on a miss, expired entry, or version mismatch.
    async fn get(&self, key: &CacheKey, policy_version: u64) -> Option<ValidationResult>;

    /// Store `result`, tagged with `policy_version`. A no-op if `result`
    /// is not cache-eligible (spec §4.4 "Safety invariant").
    async fn put(&self, key: CacheKey, result: ValidationResult, policy_version: u64);
}

/// L1 (process-local LRU) in front of L2 (shared KV), fingerprint-keyed.
///
/// Reads check L1, then L2 on miss, promoting L2 hits back into L1.
/// Writes populate both tiers (spec §4.4 "Tiers").
pub struct TwoTierCache {
    l1: L1Cache,
    l2: Arc<dyn L2Backend>,
}

impl TwoTierCache {
    /// Compose an L1 and an L2 backend into a two-tier cache.
    #[must_use]
    pub fn new(l1: L1Cache, l2: Arc<dyn L2Backend>) -> Self {
        Self { l1, l2 }
    }
}

#[async_trait]
impl ResultCache for TwoTierCache {
    async fn get(&self, key: &CacheKey, policy_version: u64) -> Option<ValidationResult> {
        if let Some(hit) = self.l1.get(key, policy_version) {
            return Some(hit);
        }

        match self.l2.get(key).await {
            Ok(Some((result, stored_version))) => {
                if stored_version != policy_version {
                    return None;
                }
                self.l1.put(key.clone(), result.clone(), stored_version);
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "L2 cache read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, result: ValidationResult, policy_version: u64) {
        if !result.verdict.is_cacheable() {
            return;
        }

        self.l1.put(key.clone(), result.clone(), policy_version);
        if let Err(e) = self.l2.put(key, result, policy_version).await {
            debug!(error = %e, "L2 cache write failed, L1 entry still stands");
        }
    }
}
