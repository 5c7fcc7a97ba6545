//! [`PolicyEngine`] — maps a finding set to a [`Verdict`] under a [`Policy`]
//! (spec §4.3).

use crate::model::{Finding, Verdict, VerdictStatus};

use super::{Action, Policy};

/// Stateless evaluator: `(findings, policy) -> Verdict`.
///
/// Holds no state of its own — every [`PolicyEngine::evaluate`] call is
/// pure given its inputs, which is what makes verdict determinism (spec
/// §8 "Determinism") checkable by construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Construct the engine. Carries no configuration; everything needed
    /// to decide a verdict lives on the [`Policy`] and the findings.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `findings` against `policy`, producing a [`Verdict`]
    /// (spec §4.3 algorithm, steps 1–5).
    #[must_use]
    pub fn evaluate(&self, findings: Vec<Finding>, policy: &Policy) -> Verdict {
        if !policy.enabled {
            return Verdict {
                status: VerdictStatus::Allowed,
                is_safe: true,
                matched_rule: None,
                message: "policy disabled".to_string(),
                findings,
            };
        }

        let mut winning_action = None;
        let mut matched_rule_name: Option<String> = None;
        let mut matched_finding: Option<&Finding> = None;

        for rule in &policy.rules {
            if !rule.enabled {
                continue;
            }
            let Some(finding) = findings.iter().find(|f| rule.match_.matches(f)) else {
                continue;
            };

            let is_new_winner = match winning_action {
                None => true,
                Some(current) => rule.action.precedence() > Action::precedence(current),
            };
            if is_new_winner {
                winning_action = Some(rule.action);
                matched_rule_name = Some(rule.name.clone());
                matched_finding = Some(finding);
            }
        }

        let (action, matched_rule) = match winning_action {
            Some(action) => (action, matched_rule_name),
            None => (policy.default_action, None),
        };

        let status = match action {
            Action::Block => VerdictStatus::Blocked,
            Action::Warn => VerdictStatus::Warned,
            Action::Allow | Action::Log => VerdictStatus::Allowed,
        };
        let is_safe = status == VerdictStatus::Allowed;

        let message = match (status, action) {
            (VerdictStatus::Blocked, _) => {
                let finding = matched_finding.expect("blocked verdict always has a matched finding");
                format!(
                    "Blocked by rule '{}': {} ({})",
                    matched_rule.as_deref().unwrap_or(""),
                    finding.pattern_name,
                    finding.severity
                )
            }
            (VerdictStatus::Allowed, Action::Allow) if findings.is_empty() => {
                "Prompt is safe".to_string()
            }
            _ => "Allowed with warnings".to_string(),
        };

        Verdict {
            status,
            is_safe,
            matched_rule,
            message,
            findings,
        }
    }
}
