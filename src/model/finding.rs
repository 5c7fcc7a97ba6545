//! [`Finding`] — a single detection event (spec §3).

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Severity;

/// Which layer of the detection pipeline produced a [`Finding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    /// Deterministic pattern match (spec §4.1).
    Regex,
    /// Semantic nearest-neighbor match (spec §4.2).
    Semantic,
    /// Produced directly by policy evaluation rather than a detector.
    Policy,
    /// Context-aware finding (e.g. a context-term-gated pattern).
    Contextual,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regex => write!(f, "regex"),
            Self::Semantic => write!(f, "semantic"),
            Self::Policy => write!(f, "policy"),
            Self::Contextual => write!(f, "contextual"),
        }
    }
}

/// One piece of evidence that a prompt contains sensitive or unsafe
/// content.
///
/// Regex findings always carry `confidence = 1.0`; semantic findings
/// carry the cosine similarity score as `confidence` (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique id for this finding, scoped to the enclosing call.
    pub id: String,
    /// Which detector produced this finding.
    pub detection_type: FindingType,
    /// Name of the pattern or reference that matched.
    pub pattern_name: String,
    /// Category the pattern belongs to (e.g. `api_keys`, `pii`).
    pub category: String,
    /// Severity of the detected content.
    pub severity: Severity,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Half-open `[start, end)` byte spans into the prompt text.
    pub match_spans: Vec<Range<usize>>,
    /// Arbitrary metadata (e.g. `similarity`, `reference_id`).
    pub metadata: HashMap<String, String>,
}

impl Finding {
    /// Construct a regex finding (`confidence` pinned to `1.0`).
    #[must_use]
    pub fn regex(
        pattern_name: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        span: Range<usize>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            detection_type: FindingType::Regex,
            pattern_name: pattern_name.into(),
            category: category.into(),
            severity,
            confidence: 1.0,
            match_spans: vec![span],
            metadata: HashMap::new(),
        }
    }

    /// Construct a semantic finding; `confidence` is the similarity score.
    #[must_use]
    pub fn semantic(
        pattern_name: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        confidence: f32,
        text_len: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            detection_type: FindingType::Semantic,
            pattern_name: pattern_name.into(),
            category: category.into(),
            severity,
            confidence,
            match_spans: vec![0..text_len],
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The key used for cross-detector deduplication (spec §4.5 step 5):
    /// `(type, pattern_name, first match span)`.
    #[must_use]
    pub fn dedup_key(&self) -> (FindingType, String, Option<Range<usize>>) {
        (
            self.detection_type,
            self.pattern_name.clone(),
            self.match_spans.first().cloned(),
        )
    }
}

/// Deterministic ordering for a merged finding set (spec §5 "Ordering
/// guarantees"): `(severity desc, type asc, pattern_name asc, span start asc)`.
#[must_use]
pub fn sort_key(f: &Finding) -> (std::cmp::Reverse<Severity>, FindingType, String, usize) {
    let start = f.match_spans.first().map_or(0, |r| r.start);
    (
        std::cmp::Reverse(f.severity),
        f.detection_type,
        f.pattern_name.clone(),
        start,
    )
}

/// Sort findings in place per the deterministic merge ordering (spec §5).
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
}

/// Merge findings from multiple detectors, deduplicating by
/// `(type, pattern_name, match_span)` and sorting deterministically
/// (spec §4.5 step 5).
#[must_use]
pub fn merge_findings(mut all: Vec<Finding>) -> Vec<Finding> {
    let mut seen = std::collections::HashSet::new();
    all.retain(|f| seen.insert(f.dedup_key()));
    sort_findings(&mut all);
    all
}
