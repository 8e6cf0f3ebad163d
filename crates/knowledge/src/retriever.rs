//! Threshold-filtered retrieval from one knowledge tier.

use crate::retry::RetryPolicy;
use crate::types::ScoredPassage;
use crate::vector_index::VectorIndex;
use std::sync::Arc;

/// An ordered, named knowledge source.
#[derive(Clone)]
pub struct Tier {
    /// Identifier used in logs and on the command line ("documents")
    pub name: String,

    /// Label attached to answers from this tier ("Documents")
    pub label: String,

    pub index: Arc<dyn VectorIndex>,
}

impl Tier {
    pub fn new(name: impl Into<String>, label: impl Into<String>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            index,
        }
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// What happened when a tier was consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStatus {
    /// The index was searched (possibly yielding nothing usable)
    Searched,
    /// No index exists, even after waiting
    Absent,
    /// The index exists but could not be searched
    Failed,
}

/// Passages from one tier that cleared the threshold.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub passages: Vec<ScoredPassage>,
    pub status: TierStatus,
}

impl Retrieval {
    fn empty(status: TierStatus) -> Self {
        Self {
            passages: Vec::new(),
            status,
        }
    }

    /// Whether later phases of the same query can skip this tier.
    pub fn is_unavailable(&self) -> bool {
        self.status != TierStatus::Searched
    }
}

/// Keep results scoring strictly above `threshold`, best first.
///
/// Lowering the threshold never removes a result.
pub fn apply_threshold(results: Vec<ScoredPassage>, threshold: f32) -> Vec<ScoredPassage> {
    let mut kept: Vec<ScoredPassage> = results
        .into_iter()
        .filter(|r| r.score > threshold)
        .collect();
    kept.sort_by(|a, b| b.score.total_cmp(&a.score));
    kept
}

/// Searches one tier at a time with a relevance threshold.
///
/// Never fails: an absent index and an unusable index both come back as an
/// empty [`Retrieval`], tagged so the caller can tell them apart.
#[derive(Debug, Clone)]
pub struct TieredRetriever {
    top_k: usize,
    retry: RetryPolicy,
}

impl TieredRetriever {
    pub fn new(top_k: usize, retry: RetryPolicy) -> Self {
        Self {
            top_k: top_k.max(1),
            retry,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Search `tier` for passages scoring above `threshold`.
    ///
    /// Only a missing index is waited for. A search error is logged and the
    /// tier treated as empty without retrying.
    pub async fn retrieve(&self, tier: &Tier, query_embedding: &[f32], threshold: f32) -> Retrieval {
        let what = format!("index for tier '{}'", tier.name);
        if !self.retry.wait_until(&what, || tier.index.exists()).await {
            tracing::info!(tier = %tier.name, "No index for tier, skipping");
            return Retrieval::empty(TierStatus::Absent);
        }

        let candidates = match tier.index.search(query_embedding, self.top_k).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(tier = %tier.name, error = %e, "Index search failed, treating tier as empty");
                return Retrieval::empty(TierStatus::Failed);
            }
        };

        let candidate_count = candidates.len();
        let top_score = candidates.first().map(|c| c.score);
        let passages = apply_threshold(candidates, threshold);

        tracing::debug!(
            tier = %tier.name,
            threshold,
            candidates = candidate_count,
            kept = passages.len(),
            top_score = ?top_score,
            "Retrieved passages"
        );

        Retrieval {
            passages,
            status: TierStatus::Searched,
        }
    }
}
