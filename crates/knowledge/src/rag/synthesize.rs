//! Grounded answer generation over a fixed set of passages.

use crate::rag::classify::{FailureClassifier, FailureReason};
use crate::types::Passage;
use kbqa_core::{AppResult, RetrievalConfig};
use kbqa_llm::{LlmClient, LlmRequest};
use kbqa_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Outcome of one synthesis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    /// A usable answer and the passages it was built from
    Answered { text: String, passages: Vec<Passage> },
    Failed(FailureReason),
}

impl Synthesis {
    pub fn is_answered(&self) -> bool {
        matches!(self, Synthesis::Answered { .. })
    }
}

/// Turns a query plus context passages into an answer using an LLM.
///
/// Holds no per-query state, so one synthesizer serves concurrent queries.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    classifier: FailureClassifier,
    max_context_passages: usize,
    temperature: f32,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            llm,
            model: model.into(),
            prompt,
            classifier: FailureClassifier::default(),
            max_context_passages: defaults.max_context_passages,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Apply classifier and generation settings from retrieval config.
    pub fn with_retrieval_config(mut self, config: &RetrievalConfig) -> Self {
        self.classifier = FailureClassifier::from_config(config);
        self.max_context_passages = config.max_context_passages.max(1);
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self
    }

    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_max_context_passages(mut self, max: usize) -> Self {
        self.max_context_passages = max.max(1);
        self
    }

    /// Answer `query` strictly from `passages`, which must be best-first.
    ///
    /// An empty passage list fails without calling the LLM. Beyond
    /// `max_context_passages` the lowest-ranked passages are dropped. Errors
    /// are only LLM or prompt failures; a non-answer is `Synthesis::Failed`.
    pub async fn synthesize(&self, query: &str, passages: &[Passage]) -> AppResult<Synthesis> {
        if passages.is_empty() {
            tracing::debug!("No passages to synthesize from");
            return Ok(Synthesis::Failed(FailureReason::EmptyContext));
        }

        let used = &passages[..passages.len().min(self.max_context_passages)];
        if used.len() < passages.len() {
            tracing::debug!(
                "Capped context at {} of {} passages",
                used.len(),
                passages.len()
            );
        }

        let mut variables = HashMap::new();
        variables.insert("context".to_string(), build_context(used));
        variables.insert("question".to_string(), query.to_string());
        let built = build_prompt(&self.prompt, &variables)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        tracing::debug!(
            provider = self.llm.provider_name(),
            passages = used.len(),
            "Requesting synthesis"
        );
        let response = self.llm.complete(&request).await?;

        match self.classifier.classify(query, &response.content) {
            Some(reason) => {
                tracing::info!("Synthesized answer rejected: {}", reason);
                Ok(Synthesis::Failed(reason))
            }
            None => Ok(Synthesis::Answered {
                text: response.content.trim().to_string(),
                passages: used.to_vec(),
            }),
        }
    }
}

/// Join passages into numbered document blocks.
fn build_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| match p.title() {
            Some(title) => format!("[Document {}] {}\n{}", i + 1, title, p.content()),
            None => format!("[Document {}]\n{}", i + 1, p.content()),
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
