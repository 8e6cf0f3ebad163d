//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A unit of retrievable text with its provenance.
///
/// Content is guaranteed non-empty: construction goes through
/// [`Passage::new`], which rejects blank text. Deserialization applies the
/// same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPassage")]
pub struct Passage {
    content: String,
    source_identifier: String,
    metadata: serde_json::Value,
}

/// Unvalidated wire form of [`Passage`].
#[derive(Deserialize)]
struct RawPassage {
    content: String,
    source_identifier: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl TryFrom<RawPassage> for Passage {
    type Error = AppError;

    fn try_from(raw: RawPassage) -> AppResult<Self> {
        Passage::new(raw.content, raw.source_identifier, raw.metadata)
    }
}

impl Passage {
    /// Create a passage, rejecting empty or whitespace-only content.
    ///
    /// `metadata` must be a JSON object (or null, which becomes `{}`).
    pub fn new(
        content: impl Into<String>,
        source_identifier: impl Into<String>,
        metadata: serde_json::Value,
    ) -> AppResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(AppError::Knowledge(
                "Passage content cannot be empty".to_string(),
            ));
        }

        let metadata = match metadata {
            serde_json::Value::Null => serde_json::json!({}),
            serde_json::Value::Object(_) => metadata,
            other => {
                return Err(AppError::Knowledge(format!(
                    "Passage metadata must be an object, got: {}",
                    other
                )))
            }
        };

        Ok(Self {
            content,
            source_identifier: source_identifier.into(),
            metadata,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Title from metadata, if any.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }

    /// Originating tier label, set when passages from several tiers are merged.
    pub fn tier(&self) -> Option<&str> {
        self.metadata.get("tier").and_then(|v| v.as_str())
    }

    /// Copy of this passage with one extra metadata entry.
    pub fn with_metadata(&self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let mut copy = self.clone();
        if let Some(map) = copy.metadata.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        copy
    }
}

/// A passage paired with its cosine similarity to the query.
///
/// Scores are comparable within one index and one query; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The LLM produced a substantive answer.
    Answered,
    /// Web results were found but could not be turned into an answer.
    Unsynthesized,
    /// Every phase came up empty.
    NoInformation,
    /// The query ran out of time.
    TimedOut,
}

/// Result of a query, returned to the caller and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Answer text, or an explanation when there is no answer
    pub text: String,

    /// Passages the answer was built from, best first
    pub source_passages: Vec<Passage>,

    /// Which tier or phase produced the answer
    pub tier_label: String,

    pub outcome: AnswerOutcome,

    /// Similarity scores aligned with `source_passages` (empty for web results)
    #[serde(default)]
    pub similarity_scores: Vec<f32>,
}

/// Label attached to answers from the combined relaxed phase.
pub const COMBINED_RELAXED_LABEL: &str = "Combined Sources (Relaxed)";

/// Label attached to answers from the combined emergency phase.
pub const COMBINED_EMERGENCY_LABEL: &str = "Combined Sources (Emergency)";

/// Label attached to answers from the web fallback.
pub const WEB_SEARCH_LABEL: &str = "Web Search";

/// Label attached to answers where nothing was found.
pub const NO_ANSWER_LABEL: &str = "None";

impl Answer {
    pub fn answered(
        text: impl Into<String>,
        source_passages: Vec<Passage>,
        tier_label: impl Into<String>,
        similarity_scores: Vec<f32>,
    ) -> Self {
        Self {
            text: text.into(),
            source_passages,
            tier_label: tier_label.into(),
            outcome: AnswerOutcome::Answered,
            similarity_scores,
        }
    }

    /// Web results handed back as sources without a narrative answer.
    pub fn unsynthesized(source_passages: Vec<Passage>) -> Self {
        Self {
            text: "I couldn't synthesize an answer from the web results, \
                   but these sources may help:"
                .to_string(),
            source_passages,
            tier_label: WEB_SEARCH_LABEL.to_string(),
            outcome: AnswerOutcome::Unsynthesized,
            similarity_scores: Vec::new(),
        }
    }

    pub fn no_information(query: &str) -> Self {
        Self {
            text: format!(
                "No relevant information found for \"{}\" in the knowledge base or on the web.",
                query
            ),
            source_passages: Vec::new(),
            tier_label: NO_ANSWER_LABEL.to_string(),
            outcome: AnswerOutcome::NoInformation,
            similarity_scores: Vec::new(),
        }
    }

    pub fn timed_out(query: &str, budget: Duration) -> Self {
        Self {
            text: format!(
                "Searching for \"{}\" timed out after {:?} before an answer was found. \
                 Try again or rephrase the question.",
                query, budget
            ),
            source_passages: Vec::new(),
            tier_label: NO_ANSWER_LABEL.to_string(),
            outcome: AnswerOutcome::TimedOut,
            similarity_scores: Vec::new(),
        }
    }

    /// Whether the answer carries a synthesized narrative.
    pub fn is_answered(&self) -> bool {
        self.outcome == AnswerOutcome::Answered
    }
}

/// Represents an ingested source (sources.jsonl tracking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    /// Unique source identifier
    pub source_id: String,

    /// Source path
    pub path: String,

    /// SHA-256 of the cleaned text, used to skip re-ingestion
    pub hash: String,

    /// When this source was indexed
    pub indexed_at: DateTime<Utc>,

    /// Number of passages created from this source
    pub chunk_count: u32,

    /// Source size in bytes
    pub byte_count: u64,
}

/// Options for the learn operation.
#[derive(Debug, Clone)]
pub struct LearnOptions {
    /// Tier to ingest into
    pub tier: String,

    /// Files or directories to learn from
    pub paths: Vec<PathBuf>,

    /// Web pages to fetch and learn from
    pub urls: Vec<String>,

    /// Clear the tier before learning
    pub reset: bool,

    /// Chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    pub chunk_overlap: usize,
}

impl LearnOptions {
    pub fn new(tier: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            tier: tier.into(),
            paths,
            urls: Vec::new(),
            reset: false,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Statistics from a learn operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnStats {
    pub tier: String,

    /// Number of sources (files and pages) ingested
    pub sources_count: u32,

    /// Sources skipped because their content was already ingested
    pub skipped_count: u32,

    /// Number of passages created
    pub chunks_count: u32,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Statistics for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStats {
    pub tier: String,
    pub label: String,
    pub index_exists: bool,
    pub passages_count: u32,
    pub sources_count: u32,
    pub index_size_bytes: u64,
    pub last_learn_at: Option<DateTime<Utc>>,
}

/// Internal chunk candidate before embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub position: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
}
