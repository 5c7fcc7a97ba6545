//! [`RegexDetector`] — the deterministic pattern-matching layer (spec §4.1).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::{Deadline, Finding, Prompt};
use crate::patterns::{Pattern, PatternProvider};

use super::Detector;

/// Context window (in characters) searched for a required context term
/// around a match (spec §4.1 step 2).
const CONTEXT_WINDOW_CHARS: usize = 64;

/// Aggregate finding cap before the scan exits early (spec §4.1 "Complexity").
const DEFAULT_MAX_FINDINGS: usize = 64;

/// Scans prompt text against a [`PatternProvider`]'s current snapshot.
pub struct RegexDetector {
    patterns: Arc<dyn PatternProvider>,
    max_findings: usize,
}

impl RegexDetector {
    /// Build a detector over `patterns`, using the default finding cap.
    #[must_use]
    pub fn new(patterns: Arc<dyn PatternProvider>) -> Self {
        Self {
            patterns,
            max_findings: DEFAULT_MAX_FINDINGS,
        }
    }

    /// Override the aggregate finding cap (spec §4.1 "early exit").
    #[must_use]
    pub fn with_max_findings(mut self, max_findings: usize) -> Self {
        self.max_findings = max_findings;
        self
    }
}

#[async_trait]
impl Detector for RegexDetector {
    fn name(&self) -> &str {
        "regex"
    }

    async fn detect(&self, prompt: &Prompt, _deadline: Deadline) -> (Vec<Finding>, bool) {
        let snapshot = self.patterns.snapshot().await;
        let text = prompt.text.as_str();

        let mut findings: Vec<Finding> = Vec::new();
        let mut by_category_span: std::collections::HashMap<(String, usize, usize), usize> =
            std::collections::HashMap::new();

        'patterns: for pattern in snapshot.all() {
            for candidate in pattern.regex.find_iter(text) {
                if findings.len() >= self.max_findings {
                    break 'patterns;
                }

                let matched = candidate.as_str();
                if !pattern.validator.check(matched) {
                    continue;
                }
                if !pattern.context_terms.is_empty()
                    && !has_context_term(text, candidate.start(), candidate.end(), &pattern.context_terms)
                {
                    continue;
                }

                let key = (pattern.category.clone(), candidate.start(), candidate.end());
                if let Some(&existing_idx) = by_category_span.get(&key) {
                    if should_replace(&findings[existing_idx], pattern) {
                        findings[existing_idx] =
                            Finding::regex(&pattern.name, &pattern.category, pattern.severity, candidate.range());
                    }
                    continue;
                }

                by_category_span.insert(key, findings.len());
                findings.push(Finding::regex(
                    &pattern.name,
                    &pattern.category,
                    pattern.severity,
                    candidate.range(),
                ));
            }
        }

        (findings, false)
    }
}

/// Whether `candidate` (a new match for `pattern`, same category and span
/// as `existing`) should replace it: higher severity wins, ties broken by
/// pattern name ascending (spec §4.1 "Overlap policy").
fn should_replace(existing: &Finding, candidate: &Pattern) -> bool {
    match candidate.severity.cmp(&existing.severity) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.name < existing.pattern_name,
    }
}

/// Whether any of `terms` occurs within [`CONTEXT_WINDOW_CHARS`] characters
/// of the match at byte range `[start, end)` in `text` (spec §4.1 step 2).
fn has_context_term(text: &str, start: usize, end: usize, terms: &[String]) -> bool {
    let window_start = char_floor(text, start.saturating_sub(CONTEXT_WINDOW_CHARS));
    let window_end = char_ceil(text, (end + CONTEXT_WINDOW_CHARS).min(text.len()));
    let Some(window) = text.get(window_start..window_end) else {
        warn!("context window fell on a non-UTF-8 boundary; skipping context check");
        return false;
    };
    let lower = window.to_lowercase();
    terms.iter().any(|t| lower.contains(&t.to_lowercase()))
}

/// Round a byte index down to the nearest UTF-8 character boundary.
fn char_floor(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Round a byte index up to the nearest UTF-8 character boundary.
fn char_ceil(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use crate::patterns::{PatternSet, StaticPatternProvider};

    fn detector_over_builtins() -> RegexDetector {
        RegexDetector::new(Arc::new(StaticPatternProvider::builtin()))
    }

    #[tokio::test]
    async fn finds_openai_key_with_exact_span() {
        let detector = detector_over_builtins();
        let prompt = Prompt::new("My API key is sk-abcdefghijklmnopqrstuvwxyz012345");
        let (findings, degraded) = detector.detect(&prompt, Deadline::default_budget()).await;
        assert!(!degraded);
        let found = findings.iter().find(|f| f.pattern_name == "openai_api_key").unwrap();
        assert_eq!(found.severity, Severity::Critical);
        assert_eq!(found.match_spans[0], 14..49);
    }

    #[tokio::test]
    async fn luhn_invalid_card_is_not_emitted() {
        let detector = detector_over_builtins();
        let prompt = Prompt::new("card 4111 1111 1111 1112");
        let (findings, _) = detector.detect(&prompt, Deadline::default_budget()).await;
        assert!(!findings.iter().any(|f| f.pattern_name == "credit_card"));
    }

    #[tokio::test]
    async fn luhn_valid_card_is_emitted() {
        let detector = detector_over_builtins();
        let prompt = Prompt::new("card 4111 1111 1111 1111");
        let (findings, _) = detector.detect(&prompt, Deadline::default_budget()).await;
        assert!(findings.iter().any(|f| f.pattern_name == "credit_card"));
    }

    #[tokio::test]
    async fn ssn_pattern_matches() {
        let detector = detector_over_builtins();
        let prompt = Prompt::new("My SSN is 123-45-6789");
        let (findings, _) = detector.detect(&prompt, Deadline::default_budget()).await;
        let found = findings.iter().find(|f| f.pattern_name == "us_ssn").unwrap();
        assert_eq!(found.category, "pii");
    }

    #[tokio::test]
    async fn generic_api_key_requires_context_term() {
        let detector = detector_over_builtins();
        let unrelated = Prompt::new("the api key to a good essay is brevity");
        let (findings, _) = detector.detect(&unrelated, Deadline::default_budget()).await;
        assert!(
            !findings.iter().any(|f| f.pattern_name == "generic_api_key"),
            "expected no match without a nearby context term"
        );

        let with_context = Prompt::new("please rotate the api key secret before shipping");
        let (findings, _) = detector.detect(&with_context, Deadline::default_budget()).await;
        assert!(findings.iter().any(|f| f.pattern_name == "generic_api_key"));
    }

    #[tokio::test]
    async fn same_category_overlap_keeps_higher_severity() {
        use crate::patterns::{validator::Validator, Pattern, PatternDef};

        let low = Pattern::compile(
            "cat",
            PatternDef {
                name: "low_pattern".to_string(),
                regex: "secret".to_string(),
                severity: Severity::Low,
                description: String::new(),
                validator: Validator::None,
                context_terms: Vec::new(),
            },
        )
        .unwrap();
        let high = Pattern::compile(
            "cat",
            PatternDef {
                name: "high_pattern".to_string(),
                regex: "secret".to_string(),
                severity: Severity::High,
                description: String::new(),
                validator: Validator::None,
                context_terms: Vec::new(),
            },
        )
        .unwrap();

        let set = PatternSet::new(vec![low, high]);
        let detector = RegexDetector::new(Arc::new(StaticPatternProvider::new(set)));
        let prompt = Prompt::new("the secret is out");
        let (findings, _) = detector.detect(&prompt, Deadline::default_budget()).await;
        let matches: Vec<_> = findings.iter().filter(|f| f.category == "cat").collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_name, "high_pattern");
    }
}
