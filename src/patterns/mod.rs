//! Deterministic pattern matching configuration (spec §4.1, §6).
//!
//! A [`Pattern`] pairs a compiled [`regex::Regex`] with the metadata
//! [`crate::detect::regex_detector::RegexDetector`] needs to turn a raw
//! match into a [`Finding`](crate::model::Finding): category, severity,
//! an optional [`Validator`], and optional context-term gating.
//!
//! [`PatternSet`] groups patterns by category (spec §6 pattern-file
//! example: `patterns: { api_keys: [...], pii: [...] }`).
//! [`PatternProvider`] is the swappable source of a [`PatternSet`]
//! snapshot — [`StaticPatternProvider`] holds one behind `RwLock<Arc<_>>`
//! so readers never observe a partially-reloaded set (design note §9).

pub mod builtin;
pub mod validator;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
// Disambiguated from this module's own `validator` submodule below — a bare
// `use validator::Validate` would silently resolve to `self::validator`
// (which has no `Validate`) instead of the `validator` crate.
use ::validator::Validate;

use crate::config::{load_document, ConfigError};
use crate::error::FirewallError;
use crate::model::Severity;

pub use validator::Validator;

/// Serde-facing pattern definition, as it appears in a pattern file
/// (spec §6). Carries the raw regex source; [`Pattern::compile`] turns
/// it into a runtime [`Pattern`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatternDef {
    /// Unique name within its category.
    #[validate(length(min = 1, message = "pattern name must not be empty"))]
    pub name: String,
    /// Raw regex source.
    #[validate(length(min = 1, message = "pattern regex must not be empty"))]
    pub regex: String,
    /// Severity when this pattern matches.
    pub severity: Severity,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Content-aware validator, if any.
    #[serde(default)]
    pub validator: Validator,
    /// Context terms that must appear near the match (spec §4.1 step 2).
    #[serde(default)]
    pub context_terms: Vec<String>,
}

/// The on-disk shape of a pattern file: a category name mapped to its
/// list of pattern definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSetDef {
    /// Category name to pattern definitions.
    pub patterns: HashMap<String, Vec<PatternDef>>,
}

/// A compiled, runtime-ready pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Unique name within its category.
    pub name: String,
    /// Category this pattern belongs to.
    pub category: String,
    /// Compiled regex.
    pub regex: Regex,
    /// Raw regex source (kept for diagnostics and re-serialization).
    pub raw: String,
    /// Severity when this pattern matches.
    pub severity: Severity,
    /// Content-aware validator run against the matched substring.
    pub validator: Validator,
    /// Context terms that must appear near the match, if any.
    pub context_terms: Vec<String>,
    /// Human-readable description.
    pub description: String,
}

impl Pattern {
    /// Compile a [`PatternDef`] into a runtime [`Pattern`].
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::PatternLoadError`] if `def.regex` fails to
    /// compile (spec §4.1: pattern compile failures are fatal at load time).
    pub fn compile(category: impl Into<String>, def: PatternDef) -> Result<Self, FirewallError> {
        let regex = Regex::new(&def.regex).map_err(|e| FirewallError::PatternLoadError {
            reason: format!("pattern '{}': {e}", def.name),
        })?;
        Ok(Self {
            name: def.name,
            category: category.into(),
            regex,
            raw: def.regex,
            severity: def.severity,
            validator: def.validator,
            context_terms: def.context_terms,
            description: def.description,
        })
    }

    /// Compile a [`builtin::BuiltinPattern`] into a runtime [`Pattern`].
    fn from_builtin(b: builtin::BuiltinPattern) -> Result<Self, FirewallError> {
        let regex = Regex::new(b.regex).map_err(|e| FirewallError::PatternLoadError {
            reason: format!("builtin pattern '{}': {e}", b.name),
        })?;
        Ok(Self {
            name: b.name.to_string(),
            category: b.category.to_string(),
            regex,
            raw: b.regex.to_string(),
            severity: b.severity,
            validator: b.validator,
            context_terms: b.context_terms.iter().map(|s| (*s).to_string()).collect(),
            description: b.description.to_string(),
        })
    }
}

/// An immutable, categorized snapshot of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    by_category: HashMap<String, Vec<Pattern>>,
}

impl PatternSet {
    /// Build a pattern set from compiled patterns, grouping by category.
    #[must_use]
    pub fn new(patterns: Vec<Pattern>) -> Self {
        let mut by_category: HashMap<String, Vec<Pattern>> = HashMap::new();
        for p in patterns {
            by_category.entry(p.category.clone()).or_default().push(p);
        }
        Self { by_category }
    }

    /// Compile a [`PatternSetDef`] (e.g. loaded from a YAML/TOML/JSON file).
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::PatternLoadError`] on the first pattern that
    /// fails structural validation (non-empty `name`/`regex`) or fails to
    /// compile.
    pub fn from_def(def: PatternSetDef) -> Result<Self, FirewallError> {
        let mut patterns = Vec::new();
        for (category, defs) in def.patterns {
            for d in defs {
                d.validate().map_err(|e| FirewallError::PatternLoadError {
                    reason: format!("pattern '{}': {}", d.name, ConfigError::from(e)),
                })?;
                patterns.push(Pattern::compile(category.clone(), d)?);
            }
        }
        Ok(Self::new(patterns))
    }

    /// The built-in pattern library (spec §6 example categories:
    /// `api_keys`, `private_keys`, `passwords`, `pii`).
    ///
    /// # Panics
    ///
    /// Never panics in practice — every built-in pattern is a fixed,
    /// known-good regex literal.
    #[must_use]
    pub fn builtin() -> Self {
        let patterns = builtin::builtin_patterns()
            .into_iter()
            .map(Pattern::from_builtin)
            .collect::<Result<Vec<_>, _>>()
            .expect("builtin patterns always compile");
        Self::new(patterns)
    }

    /// Iterate all patterns across all categories.
    pub fn all(&self) -> impl Iterator<Item = &Pattern> {
        self.by_category.values().flatten()
    }

    /// Patterns in a given category, if any.
    #[must_use]
    pub fn category(&self, name: &str) -> &[Pattern] {
        self.by_category.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of compiled patterns across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    /// Whether this set has no patterns at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of a [`PatternSet`] snapshot for the regex detector.
///
/// Implementations must hand out an atomically-consistent snapshot —
/// readers must never observe a partially-reloaded set (design note §9).
#[async_trait]
pub trait PatternProvider: Send + Sync {
    /// The current pattern set snapshot.
    async fn snapshot(&self) -> Arc<PatternSet>;
}

/// A [`PatternProvider`] backed by an in-memory snapshot, swappable via
/// [`StaticPatternProvider::reload`].
#[derive(Debug)]
pub struct StaticPatternProvider {
    current: RwLock<Arc<PatternSet>>,
}

impl StaticPatternProvider {
    /// Wrap an already-built [`PatternSet`].
    #[must_use]
    pub fn new(set: PatternSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// The built-in pattern library, ready to serve.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(PatternSet::builtin())
    }

    /// Load a pattern set from a YAML, TOML, or JSON file (spec §6).
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::PatternLoadError`] if the file cannot be
    /// read, parsed, or compiled.
    pub fn from_file(path: &Path) -> Result<Self, FirewallError> {
        let def: PatternSetDef =
            load_document(path).map_err(|e| FirewallError::PatternLoadError {
                reason: config_error_reason(&e),
            })?;
        Ok(Self::new(PatternSet::from_def(def)?))
    }

    /// Atomically replace the current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior panic occurred
    /// while holding it), matching the teacher's snapshot-swap behavior.
    pub fn reload(&self, set: PatternSet) {
        *self.current.write().expect("pattern snapshot lock poisoned") = Arc::new(set);
    }
}

fn config_error_reason(e: &ConfigError) -> String {
    e.to_string()
}

#[async_trait]
impl PatternProvider for StaticPatternProvider {
    async fn snapshot(&self) -> Arc<PatternSet> {
        Arc::clone(&self.current.read().expect("pattern snapshot lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_is_non_empty_and_categorized() {
        let set = PatternSet::builtin();
        assert!(!set.is_empty());
        assert!(!set.category("api_keys").is_empty());
        assert!(!set.category("pii").is_empty());
    }

    #[test]
    fn compile_rejects_invalid_regex() {
        let def = PatternDef {
            name: "broken".to_string(),
            regex: "(unclosed".to_string(),
            severity: Severity::Low,
            description: String::new(),
            validator: Validator::None,
            context_terms: Vec::new(),
        };
        let result = Pattern::compile("test", def);
        assert!(matches!(result, Err(FirewallError::PatternLoadError { .. })));
    }

    #[tokio::test]
    async fn static_provider_snapshot_is_consistent() {
        let provider = StaticPatternProvider::builtin();
        let snap = provider.snapshot().await;
        assert!(!snap.is_empty());
    }

    #[tokio::test]
    async fn reload_swaps_the_whole_snapshot() {
        let provider = StaticPatternProvider::builtin();
        let before = provider.snapshot().await.len();
        assert!(before > 0);

        provider.reload(PatternSet::new(Vec::new()));
        let after = provider.snapshot().await;
        assert_eq!(after.len(), 0);
    }

    #[test]
    fn from_def_rejects_empty_pattern_name() {
        let mut patterns = HashMap::new();
        patterns.insert(
            "custom".to_string(),
            vec![PatternDef {
                name: String::new(),
                regex: "foo".to_string(),
                severity: Severity::Medium,
                description: String::new(),
                validator: Validator::None,
                context_terms: Vec::new(),
            }],
        );
        let result = PatternSet::from_def(PatternSetDef { patterns });
        assert!(matches!(result, Err(FirewallError::PatternLoadError { .. })));
    }

    #[test]
    fn from_def_groups_by_category() {
        let mut patterns = HashMap::new();
        patterns.insert(
            "custom".to_string(),
            vec![PatternDef {
                name: "p1".to_string(),
                regex: "foo".to_string(),
                severity: Severity::Medium,
                description: "test pattern".to_string(),
                validator: Validator::None,
                context_terms: Vec::new(),
            }],
        );
        let set = PatternSet::from_def(PatternSetDef { patterns }).unwrap();
        assert_eq!(set.category("custom").len(), 1);
    }
}
