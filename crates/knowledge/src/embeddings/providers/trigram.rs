//! Offline embedding provider built from hashed words and character trigrams.

use crate::embeddings::provider::EmbeddingProvider;
use kbqa_core::AppResult;
use std::collections::HashMap;

/// Words too common to say anything about a passage.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "who", "how", "why", "when", "where", "does",
    "do", "did", "can", "about",
];

/// Deterministic, dependency-free embeddings for local and offline use.
///
/// Each content word adds weight to one bucket for the whole word and one
/// bucket per character trigram, so texts sharing vocabulary (or word
/// stems) land close together. Not a semantic model, but stable across
/// runs, which is all the index needs.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    /// Create a new trigram provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, seed: u64, bytes: &[u8]) -> usize {
        let hash = bytes
            .iter()
            .fold(seed, |acc, &b| acc.wrapping_mul(seed).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in word_freq {
            let freq = freq as f32;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(37, trigram.as_bytes())] += freq.sqrt();
            }

            embedding[self.bucket(31, word.as_bytes())] += freq;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_embeddings_are_unit_vectors() {
        let provider = TrigramProvider::new(384);
        let texts = vec![
            "hello world".to_string(),
            "Digital India é um programa 🎮".to_string(),
        ];

        for embedding in provider.embed_batch(&texts).await.unwrap() {
            assert_eq!(embedding.len(), 384);
            assert!((norm(&embedding) - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = TrigramProvider::new(384);
        let a = provider.embed("deterministic test").await.unwrap();
        let b = provider.embed("deterministic test").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_punctuation_does_not_change_words() {
        let provider = TrigramProvider::new(384);
        let question = provider.embed("What is Digital India?").await.unwrap();
        let statement = provider.embed("digital india").await.unwrap();
        assert!((cosine_similarity(&question, &statement) - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let provider = TrigramProvider::new(384);
        let query = provider.embed("Digital India programme launch").await.unwrap();
        let related = provider
            .embed("The Digital India programme was launched in 2015")
            .await
            .unwrap();
        let unrelated = provider
            .embed("Pasta recipes with tomato sauce")
            .await
            .unwrap();

        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated)
        );
    }

    #[tokio::test]
    async fn test_stop_words_only_gives_zero_vector() {
        let provider = TrigramProvider::new(64);
        let embedding = provider.embed("what is the").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }
}
