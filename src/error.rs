//! The top-level error taxonomy (spec §7).
//!
//! `FirewallError` is a **closed set**: only [`InputInvalid`](FirewallError::InputInvalid),
//! [`PolicyNotFound`](FirewallError::PolicyNotFound),
//! [`PolicyMalformed`](FirewallError::PolicyMalformed),
//! [`PatternLoadError`](FirewallError::PatternLoadError), and
//! [`Internal`](FirewallError::Internal) ever escape the pipeline as an
//! error. `DetectorDegraded` and `DeadlineExceeded` are internal-only —
//! they never construct a `FirewallError`; they surface instead as
//! [`ValidationResult`](crate::model::ValidationResult) metadata
//! (`degraded_detectors`, `truncated`).

use thiserror::Error;

/// Errors that can terminate a `Validate` call before a verdict is reached.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FirewallError {
    /// The prompt text was empty or exceeded the configured maximum length.
    #[error("invalid input: {reason}")]
    InputInvalid {
        /// What was wrong with the input.
        reason: String,
    },

    /// No policy is registered under the requested `policy_id`.
    #[error("policy not found: {policy_id}")]
    PolicyNotFound {
        /// The policy id that was requested.
        policy_id: String,
    },

    /// The policy document failed to parse or validate.
    #[error("policy malformed: {reason}")]
    PolicyMalformed {
        /// Description of the parse/validation failure.
        reason: String,
    },

    /// The pattern set failed to compile at load time (spec §4.1: fatal).
    #[error("pattern load error: {reason}")]
    PatternLoadError {
        /// Description of the compilation failure.
        reason: String,
    },

    /// An unexpected, unrecoverable programmer error.
    #[error("internal error: {0}")]
    Internal(String),
}
