//! [`DetectorPipeline`] — orchestrates a single `Validate` call end-to-end
//! (spec §4.5).
//!
//! # Execution model
//!
//! 1. Reject empty/oversized input immediately (`status = error`, never
//!    raised as a Rust error — see spec §7).
//! 2. Resolve the policy via [`PolicyProvider`]; a missing policy also
//!    produces an error result rather than propagating.
//! 3. Compute the fingerprint and probe the [`ResultCache`]; a hit returns
//!    immediately with `cached = true`.
//! 4. On a miss, fan detectors out concurrently over a [`tokio::task::JoinSet`],
//!    each racing the shared [`Deadline`]. A detector that times out
//!    contributes no findings and is recorded as degraded rather than
//!    failing the request.
//! 5. Findings are merged (deduplicated + sorted, spec §5 "Ordering
//!    guarantees"), semantic findings below the resolved policy's
//!    `semantic_threshold` are dropped, and the result is handed to the
//!    [`PolicyEngine`].
//! 6. A safe verdict is cached best-effort; the result is published to the
//!    [`DetectionSink`] best-effort; neither failure changes the verdict
//!    already decided.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wg_firewall::prelude::*;
//!
//! let patterns = Arc::new(StaticPatternProvider::builtin());
//! let pipeline = DetectorPipeline::builder(StaticPolicyProvider::with_default())
//!     .detector(RegexDetector::new(patterns))
//!     .build();
//!
//! let result = pipeline
//!     .validate(ValidateRequest::new("hello"), Deadline::default_budget())
//!     .await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::config::RuntimeConfig;
use crate::detect::Detector;
use crate::error::FirewallError;
use crate::model::{fingerprint, merge_findings, Deadline, FindingType, Prompt, ValidationResult, Verdict};
use crate::policy::engine::PolicyEngine;
use crate::policy::PolicyProvider;
use crate::sink::{DetectionSink, NoopSink};

/// A single `Validate` call's input (spec §6 "Validate (single)").
///
/// Thin wrapper around [`Prompt`] — kept distinct so the pipeline's public
/// surface doesn't force callers to depend on the internal data-model
/// naming, and so request-shaping helpers (`with_policy_id`, …) read
/// naturally at the call site.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// The prompt to evaluate.
    pub prompt: Prompt,
}

impl ValidateRequest {
    /// Build a request with the default policy and no identity/context.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { prompt: Prompt::new(text) }
    }

    /// Wrap an already-built [`Prompt`].
    #[must_use]
    pub fn from_prompt(prompt: Prompt) -> Self {
        Self { prompt }
    }

    /// Attach a policy id.
    #[must_use]
    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.prompt = self.prompt.with_policy_id(policy_id);
        self
    }

    /// Attach a user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.prompt = self.prompt.with_user_id(user_id);
        self
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt = self.prompt.with_context(key, value);
        self
    }
}

impl From<Prompt> for ValidateRequest {
    fn from(prompt: Prompt) -> Self {
        Self { prompt }
    }
}

/// Orchestrates a single [`ValidateRequest`] through cache, detector
/// fan-out, and policy evaluation (spec §4.5).
pub struct DetectorPipeline {
    policy_provider: Arc<dyn PolicyProvider>,
    detectors: Vec<Arc<dyn Detector>>,
    cache: Option<Arc<dyn ResultCache>>,
    sink: Arc<dyn DetectionSink>,
    policy_engine: PolicyEngine,
    max_prompt_bytes: usize,
    max_batch_size: usize,
}

impl DetectorPipeline {
    /// Start building a pipeline over the given [`PolicyProvider`].
    #[must_use]
    pub fn builder(policy_provider: impl PolicyProvider + 'static) -> DetectorPipelineBuilder {
        DetectorPipelineBuilder::new(policy_provider)
    }

    /// Validate a single request (spec §4.5, §6 "Validate (single)").
    pub async fn validate(&self, request: ValidateRequest, deadline: Deadline) -> ValidationResult {
        let start = Instant::now();
        let prompt = request.prompt;
        let request_id = Uuid::new_v4().to_string();

        if let Some(reason) = input_invalid_reason(&prompt, self.max_prompt_bytes) {
            let message = FirewallError::InputInvalid { reason }.to_string();
            return error_result(request_id, prompt.policy_id, message, start);
        }

        let policy = match self.policy_provider.policy(&prompt.policy_id).await {
            Ok(policy) => policy,
            Err(e) => return error_result(request_id, prompt.policy_id, e.to_string(), start),
        };

        let fp = fingerprint(&policy.policy_id, policy.version, &prompt.text);

        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&fp, policy.version).await {
                trace!(fingerprint = %fp, "cache hit");
                hit.request_id = request_id;
                hit.cached = true;
                hit.latency = start.elapsed();
                hit.timestamp = unix_now();
                return hit;
            }
        }

        let (findings, degraded_detectors, truncated) = self.fan_out(&prompt, deadline).await;

        let mut findings = merge_findings(findings);
        findings.retain(|f| f.detection_type != FindingType::Semantic || f.confidence >= policy.semantic_threshold);

        let verdict = self.policy_engine.evaluate(findings, &policy);

        let mut result = ValidationResult {
            request_id,
            prompt_fingerprint: fp.clone(),
            verdict,
            policy_id: policy.policy_id.clone(),
            policy_version: policy.version,
            latency: Duration::ZERO,
            cached: false,
            timestamp: unix_now(),
            metadata: HashMap::new(),
        };

        if !degraded_detectors.is_empty() {
            let names: Vec<&str> = degraded_detectors.iter().map(String::as_str).collect();
            result.mark_degraded(&names);
        }
        if truncated {
            result.mark_truncated();
        }

        if let Some(cache) = &self.cache {
            cache.put(fp, result.clone(), policy.version).await;
        }

        self.sink.record(&result).await;

        result.latency = start.elapsed();
        result
    }

    /// Validate a batch of requests in parallel under one shared deadline
    /// (spec §4.5 "Batch form", spec §6 "max 100 per call"). Results preserve
    /// input order; an individual request's failure never affects its
    /// siblings. Requests beyond `max_batch_size` each receive an
    /// `InputInvalid` error result rather than being silently dropped or
    /// failing the whole batch.
    pub async fn validate_batch(
        self: &Arc<Self>,
        requests: Vec<ValidateRequest>,
        deadline: Deadline,
    ) -> Vec<ValidationResult> {
        if requests.len() > self.max_batch_size {
            let max = self.max_batch_size;
            let (accepted, rejected) = {
                let mut requests = requests;
                let rejected = requests.split_off(max);
                (requests, rejected)
            };
            let mut results = Box::pin(self.validate_batch(accepted, deadline)).await;
            let message = FirewallError::InputInvalid {
                reason: format!("batch exceeds maximum size of {max} requests"),
            }
            .to_string();
            results.extend(rejected.into_iter().map(|request| {
                error_result(Uuid::new_v4().to_string(), request.prompt.policy_id, message.clone(), Instant::now())
            }));
            return results;
        }

        let len = requests.len();
        let mut set = JoinSet::new();
        for (idx, request) in requests.into_iter().enumerate() {
            let pipeline = Arc::clone(self);
            set.spawn(async move {
                let result = pipeline.validate(request, deadline).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<ValidationResult>> = (0..len).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!(error = %e, "batch validate task panicked"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    error_result(
                        Uuid::new_v4().to_string(),
                        String::new(),
                        format!("batch item {idx} failed unexpectedly"),
                        Instant::now(),
                    )
                })
            })
            .collect()
    }

    /// Run every configured detector concurrently, racing the shared
    /// deadline, and return `(findings, degraded_detector_names, truncated)`
    /// (spec §4.5 step 4, §5 "Deadlines and cancellation").
    async fn fan_out(
        &self,
        prompt: &Prompt,
        deadline: Deadline,
    ) -> (Vec<crate::model::Finding>, Vec<String>, bool) {
        let mut all_findings = Vec::new();
        let mut degraded = Vec::new();

        if !self.detectors.is_empty() {
            let mut set = JoinSet::new();
            for detector in &self.detectors {
                let detector = Arc::clone(detector);
                let prompt = prompt.clone();
                let remaining = deadline.remaining();
                set.spawn(async move {
                    let name = detector.name().to_string();
                    match tokio::time::timeout(remaining, detector.detect(&prompt, deadline)).await {
                        Ok((findings, is_degraded)) => (name, findings, is_degraded),
                        Err(_) => (name, Vec::new(), true),
                    }
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((name, findings, is_degraded)) => {
                        if is_degraded {
                            debug!(detector = %name, "detector degraded");
                            degraded.push(name);
                        }
                        all_findings.extend(findings);
                    }
                    Err(e) => {
                        warn!(error = %e, "detector task panicked; marking degraded");
                        degraded.push("unknown".to_string());
                    }
                }
            }
        }

        let truncated = deadline.is_expired();
        (all_findings, degraded, truncated)
    }
}

fn input_invalid_reason(prompt: &Prompt, max_bytes: usize) -> Option<String> {
    if prompt.is_empty() {
        return Some("prompt text must not be empty".to_string());
    }
    if prompt.len() > max_bytes {
        return Some(format!("prompt exceeds maximum size of {max_bytes} bytes"));
    }
    None
}

fn error_result(request_id: String, policy_id: String, message: String, start: Instant) -> ValidationResult {
    ValidationResult {
        request_id,
        prompt_fingerprint: String::new(),
        verdict: Verdict::error(message),
        policy_id,
        policy_version: 0,
        latency: start.elapsed(),
        cached: false,
        timestamp: unix_now(),
        metadata: HashMap::new(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Builder for [`DetectorPipeline`].
pub struct DetectorPipelineBuilder {
    policy_provider: Arc<dyn PolicyProvider>,
    detectors: Vec<Arc<dyn Detector>>,
    cache: Option<Arc<dyn ResultCache>>,
    sink: Arc<dyn DetectionSink>,
    max_prompt_bytes: usize,
    max_batch_size: usize,
}

impl DetectorPipelineBuilder {
    /// Start a builder over `policy_provider`, with no detectors, no cache,
    /// a [`NoopSink`], and the default [`RuntimeConfig::max_prompt_bytes`].
    #[must_use]
    pub fn new(policy_provider: impl PolicyProvider + 'static) -> Self {
        Self {
            policy_provider: Arc::new(policy_provider),
            detectors: Vec::new(),
            cache: None,
            sink: Arc::new(NoopSink),
            max_prompt_bytes: RuntimeConfig::default().max_prompt_bytes,
            max_batch_size: RuntimeConfig::default().max_batch_size,
        }
    }

    /// Add a detector to the fan-out list (order does not matter — findings
    /// are sorted deterministically after merge).
    #[must_use]
    pub fn detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    /// Add a pre-shared detector, e.g. one also held elsewhere for reload.
    #[must_use]
    pub fn shared_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Attach a [`ResultCache`] (spec §4.4). Without one, every call is a
    /// miss and nothing is ever cached.
    #[must_use]
    pub fn cache(mut self, cache: impl ResultCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Attach a pre-shared cache handle.
    #[must_use]
    pub fn shared_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a [`DetectionSink`] (defaults to [`NoopSink`]).
    #[must_use]
    pub fn sink(mut self, sink: impl DetectionSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Attach a pre-shared sink handle (useful for tests that need to
    /// inspect what was recorded — see [`crate::testing::RecordingSink`]).
    #[must_use]
    pub fn shared_sink(mut self, sink: Arc<dyn DetectionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Override the maximum accepted prompt size in bytes (spec §6
    /// `MAX_PROMPT_BYTES`).
    #[must_use]
    pub fn max_prompt_bytes(mut self, max_prompt_bytes: usize) -> Self {
        self.max_prompt_bytes = max_prompt_bytes;
        self
    }

    /// Override the maximum number of requests accepted in one
    /// `validate_batch` call (spec §6 "max 100 per call").
    #[must_use]
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Build the pipeline.
    #[must_use]
    pub fn build(self) -> DetectorPipeline {
        DetectorPipeline {
            policy_provider: self.policy_provider,
            detectors: self.detectors,
            cache: self.cache,
            sink: self.sink,
            policy_engine: PolicyEngine::new(),
            max_prompt_bytes: self.max_prompt_bytes,
            max_batch_size: self.max_batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryL2, L1Cache, TwoTierCache};
    use crate::detect::regex_detector::RegexDetector;
    use crate::model::{Finding, Severity, VerdictStatus};
    use crate::patterns::StaticPatternProvider;
    use crate::policy::{Action, Match, Policy, Rule, StaticPolicyProvider};
    use async_trait::async_trait;

    fn builtin_regex_pipeline() -> DetectorPipeline {
        DetectorPipeline::builder(StaticPolicyProvider::with_default())
            .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
            .build()
    }

    fn cache() -> TwoTierCache {
        TwoTierCache::new(
            L1Cache::new(100, Duration::from_secs(60)),
            Arc::new(InMemoryL2::new(Duration::from_secs(3600))),
        )
    }

    #[tokio::test]
    async fn safe_prompt_is_allowed_and_then_served_from_cache() {
        let pipeline = DetectorPipeline::builder(StaticPolicyProvider::with_default())
            .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
            .cache(cache())
            .build();

        let first = pipeline
            .validate(
                ValidateRequest::new("What is the capital of France?"),
                Deadline::default_budget(),
            )
            .await;
        assert_eq!(first.verdict.status, VerdictStatus::Allowed);
        assert!(first.verdict.is_safe);
        assert!(first.verdict.findings.is_empty());
        assert!(!first.cached);

        let second = pipeline
            .validate(
                ValidateRequest::new("What is the capital of France?"),
                Deadline::default_budget(),
            )
            .await;
        assert!(second.cached);
        assert_eq!(second.verdict.status, VerdictStatus::Allowed);
    }

    #[tokio::test]
    async fn openai_key_is_blocked_and_never_cached() {
        let mut policy = Policy::permissive("default");
        policy.rules = vec![Rule {
            name: "block_credentials".to_string(),
            enabled: true,
            match_: Match {
                categories: vec!["api_keys".to_string(), "private_keys".to_string(), "passwords".to_string()],
                min_severity: Some(Severity::High),
                detection_type: None,
            },
            action: Action::Block,
        }];
        let policies = StaticPolicyProvider::new();
        policies.upsert(policy);

        let the_cache = Arc::new(cache());
        let pipeline = DetectorPipeline::builder(policies)
            .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
            .shared_cache(Arc::clone(&the_cache) as Arc<dyn ResultCache>)
            .build();

        let result = pipeline
            .validate(
                ValidateRequest::new("My API key is sk-abcdefghijklmnopqrstuvwxyz012345"),
                Deadline::default_budget(),
            )
            .await;

        assert_eq!(result.verdict.status, VerdictStatus::Blocked);
        let finding = result
            .verdict
            .findings
            .iter()
            .find(|f| f.pattern_name == "openai_api_key")
            .expect("expected an openai_api_key finding");
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.match_spans[0], 14..49);

        let fp = fingerprint("default", 1, "My API key is sk-abcdefghijklmnopqrstuvwxyz012345");
        assert!(the_cache.get(&fp, 1).await.is_none());
    }

    #[tokio::test]
    async fn ssn_triggers_warn_rule() {
        let mut policy = Policy::permissive("default");
        policy.rules = vec![Rule {
            name: "warn_pii".to_string(),
            enabled: true,
            match_: Match {
                categories: vec!["pii".to_string()],
                min_severity: None,
                detection_type: None,
            },
            action: Action::Warn,
        }];
        let policies = StaticPolicyProvider::new();
        policies.upsert(policy);

        let pipeline = DetectorPipeline::builder(policies)
            .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
            .build();

        let result = pipeline
            .validate(ValidateRequest::new("My SSN is 123-45-6789"), Deadline::default_budget())
            .await;
        assert_eq!(result.verdict.status, VerdictStatus::Warned);
        let finding = &result.verdict.findings[0];
        assert_eq!(finding.category, "pii");
        assert_eq!(finding.pattern_name, "us_ssn");
    }

    #[tokio::test]
    async fn luhn_invalid_card_is_allowed() {
        let pipeline = builtin_regex_pipeline();
        let result = pipeline
            .validate(ValidateRequest::new("card 4111 1111 1111 1112"), Deadline::default_budget())
            .await;
        assert_eq!(result.verdict.status, VerdictStatus::Allowed);
        assert!(!result.verdict.findings.iter().any(|f| f.category == "pii" && f.pattern_name == "credit_card"));
    }

    #[tokio::test]
    async fn empty_prompt_is_an_error_result() {
        let pipeline = builtin_regex_pipeline();
        let result = pipeline.validate(ValidateRequest::new(""), Deadline::default_budget()).await;
        assert_eq!(result.verdict.status, VerdictStatus::Error);
    }

    #[tokio::test]
    async fn unknown_policy_is_an_error_result() {
        let pipeline = builtin_regex_pipeline();
        let result = pipeline
            .validate(
                ValidateRequest::new("hi").with_policy_id("does-not-exist"),
                Deadline::default_budget(),
            )
            .await;
        assert_eq!(result.verdict.status, VerdictStatus::Error);
    }

    struct SlowDetector {
        delay: Duration,
    }

    #[async_trait]
    impl Detector for SlowDetector {
        fn name(&self) -> &str {
            "slow_semantic_stub"
        }

        async fn detect(&self, _prompt: &Prompt, _deadline: Deadline) -> (Vec<Finding>, bool) {
            tokio::time::sleep(self.delay).await;
            (vec![Finding::semantic("would_have_matched", "test", Severity::High, 0.99, 10)], false)
        }
    }

    #[tokio::test]
    async fn deadline_exceeded_marks_degraded_and_decides_from_what_it_has() {
        let pipeline = DetectorPipeline::builder(StaticPolicyProvider::with_default())
            .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
            .detector(SlowDetector { delay: Duration::from_millis(500) })
            .build();

        let start = Instant::now();
        let result = pipeline
            .validate(ValidateRequest::new("hello there"), Deadline::from_millis(50))
            .await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_millis(200), "pipeline should not wait out the slow detector");
        assert_eq!(result.verdict.status, VerdictStatus::Allowed);
        assert!(
            result.metadata.get("degraded_detectors").is_some_and(|d| d.contains("slow_semantic_stub")),
            "expected slow_semantic_stub in degraded_detectors, got {:?}",
            result.metadata
        );
    }

    #[tokio::test]
    async fn merge_is_order_independent_across_detector_registration_order() {
        struct Finder(&'static str, &'static str);

        #[async_trait]
        impl Detector for Finder {
            fn name(&self) -> &str {
                self.0
            }
            async fn detect(&self, prompt: &Prompt, _deadline: Deadline) -> (Vec<Finding>, bool) {
                (vec![Finding::regex(self.1, "cat", Severity::Medium, 0..prompt.len())], false)
            }
        }

        let forward = DetectorPipeline::builder(StaticPolicyProvider::with_default())
            .detector(Finder("a", "pattern_a"))
            .detector(Finder("b", "pattern_b"))
            .build();
        let backward = DetectorPipeline::builder(StaticPolicyProvider::with_default())
            .detector(Finder("b", "pattern_b"))
            .detector(Finder("a", "pattern_a"))
            .build();

        let r1 = forward.validate(ValidateRequest::new("hi"), Deadline::default_budget()).await;
        let r2 = backward.validate(ValidateRequest::new("hi"), Deadline::default_budget()).await;

        let names = |r: &ValidationResult| {
            r.verdict.findings.iter().map(|f| f.pattern_name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&r1), names(&r2));
    }

    #[tokio::test]
    async fn validate_batch_rejects_requests_past_the_configured_cap() {
        let pipeline = Arc::new(
            DetectorPipeline::builder(StaticPolicyProvider::with_default())
                .detector(RegexDetector::new(Arc::new(StaticPatternProvider::builtin())))
                .max_batch_size(2)
                .build(),
        );
        let requests = vec![
            ValidateRequest::new("first"),
            ValidateRequest::new("second"),
            ValidateRequest::new("third"),
        ];
        let results = pipeline.validate_batch(requests, Deadline::default_budget()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].verdict.status, VerdictStatus::Allowed);
        assert_eq!(results[1].verdict.status, VerdictStatus::Allowed);
        assert_eq!(results[2].verdict.status, VerdictStatus::Error);
    }

    #[tokio::test]
    async fn validate_batch_preserves_input_order() {
        let pipeline = Arc::new(builtin_regex_pipeline());
        let requests = vec![
            ValidateRequest::new("first prompt"),
            ValidateRequest::new("second prompt"),
            ValidateRequest::new("third prompt"),
        ];
        let results = pipeline.validate_batch(requests, Deadline::default_budget()).await;
        assert_eq!(results.len(), 3);
        for r in &results {
            assert_eq!(r.verdict.status, VerdictStatus::Allowed);
        }
    }
}
