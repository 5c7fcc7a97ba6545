//! The shared data model flowing through the firewall core (spec §3).
//!
//! Every type here is transient — constructed for a single `Validate`
//! call and discarded after the response, except [`Severity`] and the
//! category/pattern identifiers which are stable across calls.

mod finding;
mod fingerprint;
mod prompt;
mod verdict;

pub use finding::{merge_findings, sort_findings, Finding, FindingType};
pub use fingerprint::{fingerprint, Fingerprint};
pub use prompt::{Deadline, Prompt, DEFAULT_DEADLINE_MS, DEFAULT_MAX_PROMPT_BYTES};
pub use verdict::{Verdict, VerdictStatus, ValidationResult};

use serde::{Deserialize, Serialize};

/// Severity level for a detection finding.
///
/// Ordered from lowest to highest so that `severity >= Severity::High`
/// comparisons and `Ord`-based tie-breaking work naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational — no action required.
    Info,
    /// Low risk — may warrant logging.
    Low,
    /// Medium risk — warrants investigation.
    Medium,
    /// High risk — should block in most policies.
    High,
    /// Critical — immediate block.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_round_trips_json() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, r#""high""#);
        let parsed: Severity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Severity::High);
    }
}
