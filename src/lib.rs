//! ```text
//! ValidateRequest
//!      │
//!      ▼
//! PolicyProvider ──► Policy ──► fingerprint(policy_id, version, text)
//!      │                              │
//!      │                              ▼
//!      │                         ResultCache ──hit──► ValidationResult (cached)
//!      │                              │miss
//!      │                              ▼
//!      │                    ┌─────────┴─────────┐
//!      │                    ▼                    ▼
//!      │            RegexDetector        SemanticDetector
//!      │           (PatternProvider)   (Embedder + VectorIndex)
//!      │                    └─────────┬─────────┘
//!      │                              ▼
//!      │                         FindingSet (merged, sorted)
//!      │                              │
//!      └──────────────────────►  PolicyEngine ──► Verdict
//!                                     │
//!                         safe? ──► ResultCache.put (best effort)
//!                                     │
//!                              DetectionSink.record (best effort)
//!                                     │
//!                                     ▼
//!                            ValidationResult
//! ```
//!
//! # wg-firewall
//!
//! **Prompt firewall core — detection pipeline and policy engine for LLM
//! request guardrails.**
//!
//! `wg-firewall` sits between application clients and downstream LLM
//! providers. It inspects outgoing prompts with a deterministic
//! pattern-matching layer and a semantic nearest-neighbor layer, merges
//! their findings, and hands them to a policy engine that decides whether
//! a prompt is allowed, blocked, or warned. A two-tier cache memoizes safe
//! verdicts to keep tail latency low.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wg_firewall::prelude::*;
//!
//! let patterns = Arc::new(StaticPatternProvider::builtin());
//! let policies = StaticPolicyProvider::with_default();
//! let pipeline = DetectorPipeline::builder(policies)
//!     .detector(RegexDetector::new(patterns))
//!     .cache(TwoTierCache::new(L1Cache::new(1000, Duration::from_secs(300)), Arc::new(InMemoryL2::new(Duration::from_secs(3600)))))
//!     .build();
//!
//! let result = pipeline
//!     .validate(ValidateRequest::new("hello"), Deadline::from_millis(150))
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`model`] – prompts, findings, verdicts, fingerprints — the shared
//!   data model (spec §3)
//! - [`config`] – runtime configuration (env-driven knobs) and the error
//!   type for file-backed configuration loading
//! - [`patterns`] – [`PatternProvider`](patterns::PatternProvider),
//!   compiled pattern sets, and validators (Luhn, PEM fencing)
//! - [`policy`] – [`PolicyProvider`](policy::PolicyProvider) and the
//!   [`PolicyEngine`](policy::engine::PolicyEngine) (spec §4.3)
//! - [`detect`] – the [`Detector`](detect::Detector) trait plus the
//!   regex and semantic detector implementations (spec §4.1, §4.2)
//! - [`cache`] – the two-tier [`ResultCache`](cache::ResultCache) (spec §4.4)
//! - [`sink`] – [`DetectionSink`](sink::DetectionSink), the append-only
//!   decision consumer
//! - [`pipeline`] – [`DetectorPipeline`](pipeline::DetectorPipeline), the
//!   orchestrator (spec §4.5)

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod cache;
pub mod config;
pub mod detect;
pub mod error;
pub mod model;
pub mod patterns;
pub mod pipeline;
pub mod policy;
pub mod sink;

#[cfg(feature = "testing")]
pub mod testing;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::cache::{CacheKey, InMemoryL2, L1Cache, ResultCache, TwoTierCache};
    pub use crate::config::RuntimeConfig;
    pub use crate::detect::regex_detector::RegexDetector;
    pub use crate::detect::semantic::{Embedder, SemanticDetector, VectorIndex};
    pub use crate::detect::{DegradedDetector, Detector};
    pub use crate::error::FirewallError;
    pub use crate::model::{Deadline, Finding, FindingType, Prompt, Severity, ValidationResult, Verdict};
    pub use crate::patterns::{PatternProvider, PatternSet, StaticPatternProvider};
    pub use crate::pipeline::{DetectorPipeline, ValidateRequest};
    pub use crate::policy::engine::PolicyEngine;
    pub use crate::policy::{Policy, PolicyProvider, StaticPolicyProvider};
    pub use crate::sink::DetectionSink;
}
