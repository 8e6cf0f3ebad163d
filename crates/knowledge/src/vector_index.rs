//! Vector index abstraction for knowledge passages.
//!
//! Defines a trait for provider-agnostic vector retrieval. One index backs
//! each knowledge tier.

use crate::types::ScoredPassage;
use async_trait::async_trait;
use kbqa_core::AppResult;

/// Trait for vector index backends.
///
/// Scores are cosine similarities, higher is more relevant.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether the index has been created yet.
    ///
    /// A tier that was never ingested has no index. That is a normal state,
    /// not an error.
    async fn exists(&self) -> bool;

    /// Search for the top-k most similar passages to the query embedding.
    ///
    /// Returns passages ordered by descending similarity score. Errors mean
    /// the index itself is unusable (corrupt or written by another embedder).
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredPassage>>;
}

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 for zero-length or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort by descending score and keep the best `top_k`.
///
/// NaN scores are dropped; they cannot pass any threshold.
pub(crate) fn rank(mut results: Vec<ScoredPassage>, top_k: usize) -> Vec<ScoredPassage> {
    results.retain(|r| !r.score.is_nan());
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);
    results
}
