//! Policies: the externally configured mapping from findings to a verdict
//! (spec §3, §4.3, §6).
//!
//! A [`Policy`] is a versioned, named, ordered list of [`Rule`]s plus a
//! `default_action` and `semantic_threshold`. Rules are deserialized into
//! a closed set of match predicates ([`Match`]) rather than general
//! predicate objects, so a policy document round-trips through YAML/TOML/
//! JSON and can be versioned (design note §9 "tagged structures").

pub mod engine;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{load_document, ConfigError};
use crate::error::FirewallError;
use crate::model::{Finding, Severity};

pub use engine::PolicyEngine;

/// The action a matching rule (or the policy default) prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Allow the prompt through.
    Allow,
    /// Record the finding but still allow the prompt through.
    Log,
    /// Allow the prompt through, but mark the verdict as warned.
    Warn,
    /// Refuse to forward the prompt.
    Block,
}

impl Action {
    /// Precedence rank used when multiple rules match: `block > warn > log > allow`.
    ///
    /// Matches the variant declaration order, so this could be replaced by
    /// the derived `Ord`; kept explicit because the precedence rule is a
    /// spec invariant (§4.3 step 3), not an accident of declaration order.
    fn precedence(self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::Log => 1,
            Self::Warn => 2,
            Self::Block => 3,
        }
    }
}

/// A closed-set match predicate over a [`Finding`] (spec §3 Rule.match).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Match {
    /// If present, the finding's category must be one of these.
    #[serde(default)]
    pub categories: Vec<String>,
    /// If present, the finding's severity must be at least this floor.
    #[serde(default)]
    pub min_severity: Option<Severity>,
    /// If present, the finding's detection type (as a string — `regex`,
    /// `semantic`, `policy`, `contextual`) must equal this.
    #[serde(default)]
    pub detection_type: Option<String>,
}

impl Match {
    /// Whether `finding` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, finding: &Finding) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&finding.category) {
            return false;
        }
        if let Some(floor) = self.min_severity {
            if finding.severity < floor {
                return false;
            }
        }
        if let Some(ref want_type) = self.detection_type {
            if finding.detection_type.to_string() != *want_type {
                return false;
            }
        }
        true
    }
}

/// One entry in a policy's ordered rule list (spec §3 Rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, referenced by [`crate::model::Verdict::matched_rule`].
    pub name: String,
    /// Whether this rule is considered during evaluation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The predicate over findings.
    #[serde(rename = "match")]
    pub match_: Match,
    /// The action to take if this rule matches.
    pub action: Action,
}

fn default_true() -> bool {
    true
}

/// A versioned, named set of rules (spec §3 Policy, §6 policy file).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Policy {
    /// Stable, unique policy identifier.
    #[validate(length(min = 1, message = "policy_id must not be empty"))]
    pub policy_id: String,
    /// Monotonically increasing version number.
    pub version: u64,
    /// Whether the policy is active at all (spec §4.3 step 1).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ordered rule list; earlier rules are considered first.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Minimum cosine similarity for a semantic finding to count.
    #[serde(default = "default_semantic_threshold")]
    #[validate(range(min = 0.0, max = 1.0, message = "semantic_threshold must be in [0.0, 1.0]"))]
    pub semantic_threshold: f32,
    /// Action applied when no rule matches.
    #[serde(default = "default_action")]
    pub default_action: Action,
}

fn default_semantic_threshold() -> f32 {
    0.85
}

fn default_action() -> Action {
    Action::Allow
}

impl Policy {
    /// A minimal, always-available policy: no rules, `allow` by default.
    #[must_use]
    pub fn permissive(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            version: 1,
            enabled: true,
            rules: Vec::new(),
            semantic_threshold: default_semantic_threshold(),
            default_action: Action::Allow,
        }
    }
}

/// Source of the active [`Policy`] for a given `policy_id` (spec §6).
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Fetch the policy for `policy_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::PolicyNotFound`] if no policy is registered
    /// under that id.
    async fn policy(&self, policy_id: &str) -> Result<Arc<Policy>, FirewallError>;
}

/// A [`PolicyProvider`] backed by an in-memory map, swappable via
/// [`StaticPolicyProvider::upsert`] (design note §9 "snapshot swap").
#[derive(Debug, Default)]
pub struct StaticPolicyProvider {
    policies: RwLock<HashMap<String, Arc<Policy>>>,
}

impl StaticPolicyProvider {
    /// An empty provider; policies must be added with [`Self::upsert`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// A provider pre-seeded with a single permissive `"default"` policy.
    #[must_use]
    pub fn with_default() -> Self {
        let provider = Self::new();
        provider.upsert(Policy::permissive("default"));
        provider
    }

    /// Load a single policy document from a YAML, TOML, or JSON file
    /// and register it.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::PolicyMalformed`] if the file cannot be
    /// read, parsed, or fails structural validation (non-empty `policy_id`,
    /// `semantic_threshold` in `[0.0, 1.0]`).
    pub fn load_file(&self, path: &Path) -> Result<(), FirewallError> {
        let policy: Policy = load_document(path).map_err(|e| FirewallError::PolicyMalformed {
            reason: e.to_string(),
        })?;
        policy.validate().map_err(|e| FirewallError::PolicyMalformed {
            reason: ConfigError::from(e).to_string(),
        })?;
        self.upsert(policy);
        Ok(())
    }

    /// Atomically insert or replace a policy by its `policy_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn upsert(&self, policy: Policy) {
        self.policies
            .write()
            .expect("policy map lock poisoned")
            .insert(policy.policy_id.clone(), Arc::new(policy));
    }
}

#[async_trait]
impl PolicyProvider for StaticPolicyProvider {
    async fn policy(&self, policy_id: &str) -> Result<Arc<Policy>, FirewallError> {
        self.policies
            .read()
            .expect("policy map lock poisoned")
            .get(policy_id)
            .cloned()
            .ok_or_else(|| FirewallError::PolicyNotFound {
                policy_id: policy_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_precedence_orders_block_highest() {
        assert!(Action::Block.precedence() > Action::Warn.precedence());
        assert!(Action::Warn.precedence() > Action::Log.precedence());
        assert!(Action::Log.precedence() > Action::Allow.precedence());
    }

    #[test]
    fn match_filters_by_category_and_severity() {
        let m = Match {
            categories: vec!["pii".to_string()],
            min_severity: Some(Severity::High),
            detection_type: None,
        };
        let high_pii = Finding::regex("us_ssn", "pii", Severity::High, 0..10);
        let low_pii = Finding::regex("email", "pii", Severity::Low, 0..5);
        let high_other = Finding::regex("aws_key", "api_keys", Severity::High, 0..5);

        assert!(m.matches(&high_pii));
        assert!(!m.matches(&low_pii));
        assert!(!m.matches(&high_other));
    }

    #[tokio::test]
    async fn static_provider_returns_not_found_for_unknown_policy() {
        let provider = StaticPolicyProvider::new();
        let result = provider.policy("nope").await;
        assert!(matches!(result, Err(FirewallError::PolicyNotFound { .. })));
    }

    #[tokio::test]
    async fn static_provider_with_default_resolves() {
        let provider = StaticPolicyProvider::with_default();
        let policy = provider.policy("default").await.unwrap();
        assert_eq!(policy.policy_id, "default");
        assert_eq!(policy.default_action, Action::Allow);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_policy() {
        let provider = StaticPolicyProvider::with_default();
        let mut updated = Policy::permissive("default");
        updated.version = 2;
        provider.upsert(updated);
        let policy = provider.policy("default").await.unwrap();
        assert_eq!(policy.version, 2);
    }

    #[test]
    fn load_file_rejects_out_of_range_semantic_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(
            &path,
            "policy_id: default\nversion: 1\nenabled: true\nsemantic_threshold: 5.0\nrules: []\n",
        )
        .unwrap();

        let provider = StaticPolicyProvider::new();
        let result = provider.load_file(&path);
        assert!(matches!(result, Err(FirewallError::PolicyMalformed { .. })));
    }

    #[test]
    fn load_file_rejects_empty_policy_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(
            &path,
            "policy_id: ''\nversion: 1\nenabled: true\nrules: []\n",
        )
        .unwrap();

        let provider = StaticPolicyProvider::new();
        let result = provider.load_file(&path);
        assert!(matches!(result, Err(FirewallError::PolicyMalformed { .. })));
    }
}
