//! [`SemanticDetector`] — the nearest-neighbor detection layer (spec §4.2).

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::model::{Deadline, Finding, Prompt, Severity};

use super::Detector;

/// Maximum characters embedded per call (spec §4.2 step 1).
const DEFAULT_MAX_EMBED_CHARS: usize = 2048;

/// Number of nearest neighbors requested per query (spec §4.2 step 3).
const DEFAULT_TOP_K: usize = 5;

/// Errors an [`Embedder`] backend can raise.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedding backend could not produce a vector in time or failed outright.
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Produces a fixed-dimensional vector for a text span (spec §2 "Embedder").
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`. Implementations should respect `text` already being
    /// truncated by the caller to `max_embed_chars`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// One nearest-neighbor hit from a [`VectorIndex`] query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    /// Unique id of the matched reference.
    pub id: String,
    /// Label surfaced as `Finding.pattern_name`.
    pub label: String,
    /// Category surfaced as `Finding.category`.
    pub category: String,
    /// Severity surfaced as `Finding.severity`.
    pub severity: Severity,
    /// Cosine similarity in `[-1.0, 1.0]` (expected near `[0.0, 1.0]` for
    /// normalized embeddings).
    pub score: f32,
}

/// Approximate nearest-neighbor store over known-sensitive reference
/// embeddings (spec §2 "VectorIndex").
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Query for the `top_k` nearest references to `vector`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, super::vector_index::VectorIndexError>;
}

/// Composes an [`Embedder`] and a [`VectorIndex`] into a [`Detector`]
/// (spec §4.2).
pub struct SemanticDetector<E, V> {
    embedder: E,
    index: V,
    threshold: f32,
    max_embed_chars: usize,
    top_k: usize,
}

impl<E: Embedder, V: VectorIndex> SemanticDetector<E, V> {
    /// Build a detector with the given similarity `threshold` (typically
    /// `policy.semantic_threshold`) and spec-default `max_embed_chars`/`top_k`.
    #[must_use]
    pub fn new(embedder: E, index: V, threshold: f32) -> Self {
        Self {
            embedder,
            index,
            threshold,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the truncation length for embedding (spec §4.2 step 1).
    #[must_use]
    pub fn with_max_embed_chars(mut self, max_embed_chars: usize) -> Self {
        self.max_embed_chars = max_embed_chars;
        self
    }

    /// Override the number of neighbors requested per query.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn truncate(&self, text: &str) -> &str {
        if text.chars().count() <= self.max_embed_chars {
            return text;
        }
        match text.char_indices().nth(self.max_embed_chars) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }
}

#[async_trait]
impl<E: Embedder + Send + Sync, V: VectorIndex + Send + Sync> Detector for SemanticDetector<E, V> {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn detect(&self, prompt: &Prompt, deadline: Deadline) -> (Vec<Finding>, bool) {
        let truncated = self.truncate(&prompt.text);

        let vector = match self.embedder.embed(truncated).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "semantic detector: embedding failed, marking degraded");
                return (Vec::new(), true);
            }
        };

        if deadline.is_expired() {
            warn!("semantic detector: deadline expired before index query");
            return (Vec::new(), true);
        }

        let matches = match self.index.query(&vector, self.top_k).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "semantic detector: index query failed, marking degraded");
                return (Vec::new(), true);
            }
        };

        let text_len = prompt.text.len();
        let findings = matches
            .into_iter()
            .filter(|m| m.score >= self.threshold)
            .map(|m| {
                Finding::semantic(m.label, m.category, m.severity, m.score, text_len)
                    .with_metadata("similarity", format!("{:.4}", m.score))
                    .with_metadata("reference_id", m.id)
            })
            .collect();

        (findings, false)
    }
}
