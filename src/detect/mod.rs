//! Detectors: pluggable sources of [`Finding`]s (spec §2, design note §9
//! "explicit capability set").
//!
//! Every detector exposes the same minimal contract —
//! `detect(prompt, deadline) -> (findings, degraded)` — so the
//! [`DetectorPipeline`](crate::pipeline::DetectorPipeline) never downcasts
//! to a concrete type; new detectors are just additional trait objects in
//! the fan-out list.

pub mod regex_detector;
pub mod semantic;
pub mod vector_index;

use async_trait::async_trait;

use crate::model::{Deadline, Finding, Prompt};

pub use regex_detector::RegexDetector;
pub use semantic::{Embedder, SemanticDetector, VectorIndex};

/// A detection layer run by the pipeline during fan-out.
///
/// `detect` must never suspend past `deadline` without checking it —
/// long-running work (embedding, index queries) should poll
/// [`Deadline::is_expired`] at natural suspension points. A detector that
/// cannot finish in time should return what it has with `degraded = true`
/// rather than hang; the pipeline also races the call against the deadline
/// independently (spec §4.5 step 4).
#[async_trait]
pub trait Detector: Send + Sync {
    /// Human-readable name used in `degraded_detectors` metadata.
    fn name(&self) -> &str;

    /// Scan `prompt` for findings, honoring `deadline` on a best-effort basis.
    ///
    /// Returns `(findings, degraded)`; `degraded = true` means a backend
    /// failed or the deadline was hit before the detector could finish —
    /// never that the prompt was clean.
    async fn detect(&self, prompt: &Prompt, deadline: Deadline) -> (Vec<Finding>, bool);
}

/// Wraps any [`Detector`], marking it degraded whenever its deadline has
/// already expired before `detect` is even invoked — a cheap early-exit
/// used by [`crate::pipeline::DetectorPipeline`] so an exhausted budget
/// never starts pointless work.
pub struct DegradedDetector<D> {
    inner: D,
}

impl<D: Detector> DegradedDetector<D> {
    /// Wrap `inner`.
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: Detector> Detector for DegradedDetector<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn detect(&self, prompt: &Prompt, deadline: Deadline) -> (Vec<Finding>, bool) {
        if deadline.is_expired() {
            return (Vec::new(), true);
        }
        self.inner.detect(prompt, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct AlwaysFindsOne;

    #[async_trait]
    impl Detector for AlwaysFindsOne {
        fn name(&self) -> &str {
            "always_finds_one"
        }

        async fn detect(&self, prompt: &Prompt, _deadline: Deadline) -> (Vec<Finding>, bool) {
            (
                vec![crate::model::Finding::regex(
                    "stub",
                    "test",
                    crate::model::Severity::Low,
                    0..prompt.len(),
                )],
                false,
            )
        }
    }

    #[tokio::test]
    async fn degraded_wrapper_short_circuits_on_expired_deadline() {
        let wrapped = DegradedDetector::new(AlwaysFindsOne);
        let expired = Deadline::from_millis(0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let (findings, degraded) = wrapped.detect(&Prompt::new("hi"), expired).await;
        assert!(findings.is_empty());
        assert!(degraded);
    }

    #[tokio::test]
    async fn degraded_wrapper_passes_through_when_not_expired() {
        let wrapped = DegradedDetector::new(AlwaysFindsOne);
        let fresh = Deadline::default_budget();
        let (findings, degraded) = wrapped.detect(&Prompt::new("hi"), fresh).await;
        assert_eq!(findings.len(), 1);
        assert!(!degraded);
    }
}
