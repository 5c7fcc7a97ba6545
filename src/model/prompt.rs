//! [`Prompt`] — the text under evaluation — and [`Deadline`], the
//! per-request time budget propagated to every suspending subcall.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default maximum prompt length in bytes (spec §3, §6 `MAX_PROMPT_BYTES`).
pub const DEFAULT_MAX_PROMPT_BYTES: usize = 64 * 1024;

/// The text to validate, plus identity and policy routing.
///
/// `text` is never logged verbatim outside the [`DetectionSink`](crate::sink::DetectionSink) —
/// everywhere else it is represented only by its [`Fingerprint`](super::Fingerprint).
#[derive(Debug, Clone)]
pub struct Prompt {
    /// The prompt text itself.
    pub text: String,
    /// Opaque caller-supplied user identifier.
    pub user_id: Option<String>,
    /// Which policy to evaluate against. Defaults to `"default"`.
    pub policy_id: String,
    /// Arbitrary caller context (not inspected by the core).
    pub context: HashMap<String, String>,
}

impl Prompt {
    /// Construct a prompt with the default policy and no identity/context.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: None,
            policy_id: "default".to_string(),
            context: HashMap::new(),
        }
    }

    /// Attach a policy id.
    #[must_use]
    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = policy_id.into();
        self
    }

    /// Attach a user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Byte length of the prompt text.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the prompt text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A per-request time budget, propagated to every suspending subcall
/// (spec §5). Cheap to clone — carries only an `Instant` and a `Duration`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

/// Default per-request deadline (spec §5 `DEADLINE_MS`).
pub const DEFAULT_DEADLINE_MS: u64 = 150;

impl Deadline {
    /// Start a new deadline with the given budget, counted from now.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self {
            start: Instant::now(),
            budget: Duration::from_millis(millis),
        }
    }

    /// The default 150ms deadline (spec §5).
    #[must_use]
    pub fn default_budget() -> Self {
        Self::from_millis(DEFAULT_DEADLINE_MS)
    }

    /// Time remaining before the deadline expires. Zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    /// Whether the deadline has already expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Wall-clock time elapsed since the deadline was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_defaults_to_default_policy() {
        let p = Prompt::new("hi");
        assert_eq!(p.policy_id, "default");
        assert!(p.user_id.is_none());
    }

    #[test]
    fn prompt_builder_chains() {
        let p = Prompt::new("hi")
            .with_policy_id("strict")
            .with_user_id("u-1")
            .with_context("source", "cli");
        assert_eq!(p.policy_id, "strict");
        assert_eq!(p.user_id.as_deref(), Some("u-1"));
        assert_eq!(p.context.get("source").map(String::as_str), Some("cli"));
    }

    #[test]
    fn deadline_not_expired_immediately() {
        let d = Deadline::from_millis(50);
        assert!(!d.is_expired());
        assert!(d.remaining() <= Duration::from_millis(50));
    }

    #[test]
    fn deadline_expires_after_budget() {
        let d = Deadline::from_millis(0);
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.is_expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }
}
