//! [`Verdict`] and [`ValidationResult`] — the final decision for a prompt
//! (spec §3).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Finding, Fingerprint};

/// The final decision for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// The prompt may proceed to the downstream model.
    Allowed,
    /// The prompt must not be forwarded.
    Blocked,
    /// The prompt may proceed, but the decision carries a warning.
    Warned,
    /// The request could not be evaluated (bad input, missing policy, …).
    Error,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Blocked => write!(f, "blocked"),
            Self::Warned => write!(f, "warned"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The decision produced by the [`PolicyEngine`](crate::policy::engine::PolicyEngine)
/// for one merged finding set under one [`Policy`](crate::policy::Policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall status.
    pub status: VerdictStatus,
    /// `true` iff `status == Allowed`.
    pub is_safe: bool,
    /// Name of the rule that produced the winning action, if any.
    pub matched_rule: Option<String>,
    /// Human-readable explanation (spec §4.3 "Messages").
    pub message: String,
    /// All findings surfaced during detection, regardless of the verdict.
    pub findings: Vec<Finding>,
}

impl Verdict {
    /// An `allowed` verdict with no findings: `"Prompt is safe"`.
    #[must_use]
    pub fn safe() -> Self {
        Self {
            status: VerdictStatus::Allowed,
            is_safe: true,
            matched_rule: None,
            message: "Prompt is safe".to_string(),
            findings: Vec::new(),
        }
    }

    /// An `error` verdict — never produced via rule evaluation, only by
    /// the pipeline's input/policy-resolution error paths (spec §7).
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Error,
            is_safe: false,
            matched_rule: None,
            message: message.into(),
            findings: Vec::new(),
        }
    }

    /// Whether this verdict is eligible for caching (spec §4.4 "Safety
    /// invariant"): `allowed` with no findings at all.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status == VerdictStatus::Allowed && self.findings.is_empty()
    }
}

/// The full result of one `Validate` call (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Unique id for this call.
    pub request_id: String,
    /// Fingerprint of the `(policy, version, prompt)` triple that was evaluated.
    pub prompt_fingerprint: Fingerprint,
    /// The decision.
    pub verdict: Verdict,
    /// Policy identifier that was evaluated.
    pub policy_id: String,
    /// Policy version that was evaluated.
    pub policy_version: u64,
    /// Wall-clock latency of the call.
    #[serde(with = "duration_millis")]
    pub latency: Duration,
    /// Whether this result was served from cache.
    pub cached: bool,
    /// Unix timestamp (seconds) when the result was produced.
    pub timestamp: u64,
    /// Extra result metadata — `degraded_detectors`, `truncated`, etc.
    /// (spec §5, §7).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ValidationResult {
    /// Mark the named detectors as degraded in the result metadata
    /// (spec §7 "degraded_detectors").
    pub fn mark_degraded(&mut self, detectors: &[&str]) {
        if detectors.is_empty() {
            return;
        }
        self.metadata
            .insert("degraded_detectors".to_string(), detectors.join(","));
    }

    /// Mark the result as truncated by deadline expiry (spec §5).
    pub fn mark_truncated(&mut self) {
        self.metadata.insert("truncated".to_string(), "true".to_string());
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
