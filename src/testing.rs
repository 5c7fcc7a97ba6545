//! In-memory fakes for integrators building their own test suites against
//! this crate, gated behind the `testing` feature.
//!
//! These mirror the fixtures the core's own tests use internally
//! ([`RegexDetector`] over [`StaticPatternProvider::builtin`],
//! [`InMemoryVectorIndex`], [`TwoTierCache`] over [`InMemoryL2`]) so a
//! downstream crate wiring up `wg-firewall` can assert against the same
//! builtin pattern set and a deterministic embedder without standing up a
//! real embedding backend or shared cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{InMemoryL2, L1Cache, ResultCache, TwoTierCache};
use crate::detect::regex_detector::RegexDetector;
use crate::detect::semantic::{EmbedError, Embedder};
use crate::detect::vector_index::InMemoryVectorIndex;
use crate::model::ValidationResult;
use crate::patterns::StaticPatternProvider;
use crate::pipeline::DetectorPipeline;
use crate::policy::{Policy, StaticPolicyProvider};
use crate::sink::DetectionSink;

/// An [`Embedder`] that returns a fixed vector regardless of input text.
///
/// Useful for exercising the semantic layer deterministically: pair with
/// an [`InMemoryVectorIndex`] whose reference vectors you control, and the
/// cosine similarity between query and reference becomes entirely
/// predictable.
#[derive(Debug, Clone)]
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    /// Always embed to `vector`.
    #[must_use]
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vector.clone())
    }
}

/// An [`Embedder`] that always fails, for exercising the degraded path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Failed("test embedder always fails".to_string()))
    }
}

/// A [`DetectionSink`] that retains every recorded result in memory,
/// for asserting what the pipeline published.
#[derive(Debug, Default)]
pub struct RecordingSink {
    results: Mutex<Vec<ValidationResult>>,
}

impl RecordingSink {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every result recorded so far, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn results(&self) -> Vec<ValidationResult> {
        self.results.lock().expect("recording sink lock poisoned").clone()
    }

    /// Number of results recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.lock().expect("recording sink lock poisoned").len()
    }

    /// Whether no results have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DetectionSink for RecordingSink {
    async fn record(&self, result: &ValidationResult) {
        self.results
            .lock()
            .expect("recording sink lock poisoned")
            .push(result.clone());
    }
}

/// A fresh [`TwoTierCache`] over an in-memory L1 and L2, with generous
/// capacity and TTLs suited to a test run's lifetime.
#[must_use]
pub fn in_memory_cache() -> TwoTierCache {
    TwoTierCache::new(
        L1Cache::new(1000, Duration::from_secs(300)),
        Arc::new(InMemoryL2::new(Duration::from_secs(300))),
    )
}

/// A cache handle wrapped as `Arc<dyn ResultCache>`, for builders that
/// need to retain a shareable reference alongside the pipeline.
#[must_use]
pub fn shared_in_memory_cache() -> Arc<dyn ResultCache> {
    Arc::new(in_memory_cache())
}

/// A pipeline wired with [`RegexDetector`] over the builtin pattern set
/// and the `"default"` permissive policy — no cache, no sink.
#[must_use]
pub fn builtin_pipeline() -> DetectorPipeline {
    DetectorPipeline::builder(StaticPolicyProvider::with_default())
        .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
        .build()
}

/// Like [`builtin_pipeline`], but registering `policy` (under its own
/// `policy_id`) instead of the permissive default.
#[must_use]
pub fn builtin_pipeline_with_policy(policy: Policy) -> DetectorPipeline {
    let policies = StaticPolicyProvider::new();
    policies.upsert(policy);
    DetectorPipeline::builder(policies)
        .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
        .build()
}

/// An [`InMemoryVectorIndex`] pre-seeded with one reference embedding
/// named `label` under `category`/`severity`, at `vector`.
#[must_use]
pub fn single_reference_index(
    label: &str,
    category: &str,
    severity: crate::model::Severity,
    vector: Vec<f32>,
) -> InMemoryVectorIndex {
    let index = InMemoryVectorIndex::new();
    index.insert(crate::detect::vector_index::ReferenceEmbedding {
        id: format!("ref-{label}"),
        label: label.to_string(),
        category: category.to_string(),
        severity,
        vector,
    });
    index
}

/// Convenience conversion for inspecting a [`ValidationResult`]'s metadata
/// map in assertions without repeating `.metadata.get(...).map(...)`.
#[must_use]
pub fn metadata_snapshot(result: &ValidationResult) -> HashMap<String, String> {
    result.metadata.clone()
}
