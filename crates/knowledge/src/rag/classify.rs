//! Detection of answers that are really "I don't know".

use kbqa_core::config::DEFAULT_FAILURE_PHRASES;
use kbqa_core::RetrievalConfig;

/// Why a synthesized answer was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// There was nothing to answer from
    EmptyContext,
    /// The answer contains a known failure phrase
    FailurePhrase(String),
    /// The trimmed answer has fewer characters than required
    TooShort(usize),
    /// The answer only repeats the question
    RestatedQuestion,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::EmptyContext => write!(f, "no context passages"),
            FailureReason::FailurePhrase(p) => write!(f, "contains failure phrase \"{}\"", p),
            FailureReason::TooShort(n) => write!(f, "answer too short ({} chars)", n),
            FailureReason::RestatedQuestion => write!(f, "answer restates the question"),
        }
    }
}

/// Case-insensitive predicate separating real answers from non-answers.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    phrases: Vec<String>,
    min_chars: usize,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_PHRASES.iter().map(|p| p.to_string()).collect(),
            15,
        )
    }
}

impl FailureClassifier {
    pub fn new(phrases: Vec<String>, min_chars: usize) -> Self {
        let phrases = phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases, min_chars }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.failure_phrases.clone(), config.min_answer_chars)
    }

    /// Classify `answer` given to `query`. `None` means the answer is usable.
    pub fn classify(&self, query: &str, answer: &str) -> Option<FailureReason> {
        let trimmed = answer.trim();
        let length = trimmed.chars().count();
        if length < self.min_chars {
            return Some(FailureReason::TooShort(length));
        }

        let lowered = trimmed.to_lowercase();
        if let Some(phrase) = self.phrases.iter().find(|p| lowered.contains(p.as_str())) {
            return Some(FailureReason::FailurePhrase(phrase.clone()));
        }

        if restates(query, trimmed) {
            return Some(FailureReason::RestatedQuestion);
        }

        None
    }

    pub fn is_failure(&self, query: &str, answer: &str) -> bool {
        self.classify(query, answer).is_some()
    }
}

fn restates(query: &str, answer: &str) -> bool {
    let query = normalize(query);
    if query.is_empty() {
        return false;
    }
    let normalized = normalize(answer);
    normalized == query || (answer.ends_with('?') && normalized.starts_with(&query))
}

/// Lowercase, drop punctuation, collapse whitespace.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
