//! In-memory [`VectorIndex`] implementation.
//!
//! Uses `Vec` behind `std::sync::RwLock`, so searches never observe a
//! half-written insert. Search is brute-force cosine similarity. Useful for
//! tests and for callers that assemble passages at runtime.

use crate::types::{Passage, ScoredPassage};
use crate::vector_index::{cosine_similarity, rank, VectorIndex};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use std::sync::RwLock;

struct StoredPassage {
    passage: Passage,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct MemoryIndex {
    passages: RwLock<Vec<StoredPassage>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Add a passage with its embedding.
    pub fn insert(&self, passage: Passage, vector: Vec<f32>) -> AppResult<()> {
        let mut passages = self
            .passages
            .write()
            .map_err(|_| AppError::Knowledge("Memory index lock poisoned".to_string()))?;
        passages.push(StoredPassage { passage, vector });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn exists(&self) -> bool {
        true
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredPassage>> {
        let passages = self
            .passages
            .read()
            .map_err(|_| AppError::Knowledge("Memory index lock poisoned".to_string()))?;

        let results = passages
            .iter()
            .map(|stored| {
                ScoredPassage::new(
                    stored.passage.clone(),
                    cosine_similarity(query_embedding, &stored.vector),
                )
            })
            .collect();

        Ok(rank(results, top_k))
    }
}
