//! [`DetectionSink`] — an append-only, best-effort consumer of decisions
//! and findings for downstream persistence (spec §2, §5 "Backpressure").
//!
//! The sink is explicitly out of core scope beyond its interface (spec
//! §1): the core only guarantees a non-blocking, bounded publish — what
//! happens to the record afterward (database, message queue, audit log)
//! is the caller's concern.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::model::ValidationResult;

/// Consumes completed [`ValidationResult`]s. Implementations must not
/// block the pipeline — `record` should enqueue and return (spec §5
/// "backpressure": bounded send with drop-and-count on saturation).
#[async_trait]
pub trait DetectionSink: Send + Sync {
    /// Record a completed validation result. Best-effort: failures here
    /// must never change the verdict already returned to the caller.
    async fn record(&self, result: &ValidationResult);
}

/// A sink that discards everything. Used as the default when no
/// downstream persistence is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl DetectionSink for NoopSink {
    async fn record(&self, _result: &ValidationResult) {}
}

/// A sink backed by a bounded `tokio::mpsc` channel. `record` is
/// non-blocking: on a full channel the result is dropped and a counter
/// is incremented rather than applying backpressure to the pipeline
/// (spec §5).
pub struct ChannelSink {
    sender: mpsc::Sender<ValidationResult>,
    dropped: std::sync::atomic::AtomicU64,
}

impl ChannelSink {
    /// Build a sink with the given channel capacity, returning the sink
    /// and the receiving half for a downstream consumer task.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ValidationResult>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                dropped: std::sync::atomic::AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Number of results dropped so far due to channel saturation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl DetectionSink for ChannelSink {
    async fn record(&self, result: &ValidationResult) {
        if let Err(e) = self.sender.try_send(result.clone()) {
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!(error = %e, "detection sink channel saturated, dropping result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::model::Verdict;

    fn result() -> ValidationResult {
        ValidationResult {
            request_id: "r1".to_string(),
            prompt_fingerprint: "fp".to_string(),
            verdict: Verdict::safe(),
            policy_id: "default".to_string(),
            policy_version: 1,
            latency: Duration::from_millis(1),
            cached: false,
            timestamp: 0,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn noop_sink_accepts_anything() {
        NoopSink.record(&result()).await;
    }

    #[tokio::test]
    async fn channel_sink_delivers_to_receiver() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.record(&result()).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request_id, "r1");
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn channel_sink_drops_and_counts_on_saturation() {
        let (sink, _rx) = ChannelSink::new(1);
        sink.record(&result()).await;
        sink.record(&result()).await;
        sink.record(&result()).await;
        assert!(sink.dropped_count() >= 1);
    }
}
