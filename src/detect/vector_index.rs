//! [`VectorIndex`] implementations: an HNSW-backed approximate index and an
//! always-available brute-force exact fallback (spec §2 "VectorIndex").
//!
//! The HNSW adapter is grounded in the same `hnsw_rs` crate the pack's
//! vector-search example reaches for; the brute-force index trades recall
//! for zero setup cost and is what [`crate::testing`] fixtures use.

use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use super::semantic::{VectorIndex, VectorMatch};
use crate::model::Severity;

/// Errors raised while querying or populating a [`VectorIndex`].
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// The query vector's dimensionality did not match the index.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was built with.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
}

/// A reference embedding stored in a [`VectorIndex`] (spec §6 "Persisted
/// artifacts": `id`, `label`, `category`, `severity`, `vector`).
#[derive(Debug, Clone)]
pub struct ReferenceEmbedding {
    /// Unique id for this reference.
    pub id: String,
    /// Label surfaced as `Finding.pattern_name` on a match.
    pub label: String,
    /// Category surfaced as `Finding.category` on a match.
    pub category: String,
    /// Severity surfaced as `Finding.severity` on a match.
    pub severity: Severity,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Exact brute-force nearest-neighbor search over reference embeddings.
///
/// Always available (no optional dependency); used as the `vector-hnsw`
/// fallback and by in-memory test fixtures.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    references: RwLock<Vec<ReferenceEmbedding>>,
}

impl InMemoryVectorIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            references: RwLock::new(Vec::new()),
        }
    }

    /// Add a reference embedding.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, reference: ReferenceEmbedding) {
        self.references
            .write()
            .expect("vector index lock poisoned")
            .push(reference);
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, VectorIndexError> {
        let references = self.references.read().expect("vector index lock poisoned");
        let mut scored: Vec<VectorMatch> = references
            .iter()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                label: r.label.clone(),
                category: r.category.clone(),
                severity: r.severity,
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(feature = "vector-hnsw")]
pub use hnsw_backed::HnswVectorIndex;

#[cfg(feature = "vector-hnsw")]
mod hnsw_backed {
    use std::sync::RwLock;

    use async_trait::async_trait;
    use hnsw_rs::dist::DistCosine;
    use hnsw_rs::hnsw::{Hnsw, Neighbour};

    use super::{ReferenceEmbedding, VectorIndex, VectorIndexError, VectorMatch};

    /// Approximate nearest-neighbor search backed by `hnsw_rs`'s HNSW graph.
    ///
    /// Recall is approximate by construction — acceptable here because a
    /// missed semantic match degrades to "no finding", never a false
    /// block, and the regex layer remains exact.
    pub struct HnswVectorIndex {
        graph: RwLock<Hnsw<'static, f32, DistCosine>>,
        references: RwLock<Vec<ReferenceEmbedding>>,
    }

    impl HnswVectorIndex {
        /// Build an index with the given max neighbors-per-layer and
        /// max-layers parameters (mirrors `hnsw_rs::Hnsw::new` directly).
        #[must_use]
        pub fn new(max_nb_connection: usize, max_layer: usize, ef_construction: usize) -> Self {
            Self {
                graph: RwLock::new(Hnsw::new(
                    max_nb_connection,
                    10_000,
                    max_layer,
                    ef_construction,
                    DistCosine {},
                )),
                references: RwLock::new(Vec::new()),
            }
        }

        /// Insert a reference embedding into the graph.
        ///
        /// # Panics
        ///
        /// Panics if either internal lock is poisoned.
        pub fn insert(&self, reference: ReferenceEmbedding) {
            let mut references = self.references.write().expect("reference lock poisoned");
            let idx = references.len();
            self.graph
                .write()
                .expect("hnsw graph lock poisoned")
                .insert((&reference.vector, idx));
            references.push(reference);
        }
    }

    #[async_trait]
    impl VectorIndex for HnswVectorIndex {
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorMatch>, VectorIndexError> {
            let graph = self.graph.read().expect("hnsw graph lock poisoned");
            let references = self.references.read().expect("reference lock poisoned");
            let neighbours: Vec<Neighbour> = graph.search(vector, top_k, 64);

            Ok(neighbours
                .into_iter()
                .filter_map(|n| references.get(n.get_origin_id()).map(|r| (n, r)))
                .map(|(n, r)| VectorMatch {
                    id: r.id.clone(),
                    label: r.label.clone(),
                    category: r.category.clone(),
                    severity: r.severity,
                    // hnsw_rs reports cosine *distance*; similarity = 1 - distance.
                    score: 1.0 - n.distance,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(label: &str, vector: Vec<f32>) -> ReferenceEmbedding {
        ReferenceEmbedding {
            id: format!("ref-{label}"),
            label: label.to_string(),
            category: "network".to_string(),
            severity: Severity::High,
            vector,
        }
    }

    #[tokio::test]
    async fn brute_force_returns_closest_first() {
        let index = InMemoryVectorIndex::new();
        index.insert(reference("internal_hostname", vec![1.0, 0.0]));
        index.insert(reference("unrelated", vec![0.0, 1.0]));

        let results = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].label, "internal_hostname");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn brute_force_respects_top_k() {
        let index = InMemoryVectorIndex::new();
        for i in 0..10 {
            index.insert(reference(&format!("r{i}"), vec![i as f32, 1.0]));
        }
        let results = index.query(&[5.0, 1.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_results() {
        let index = InMemoryVectorIndex::new();
        let results = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
