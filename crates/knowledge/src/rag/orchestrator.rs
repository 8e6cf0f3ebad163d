//! Tier escalation for a single query.
//!
//! A query walks a fixed chain of phases and stops at the first one that
//! yields a usable answer:
//!
//! 1. each tier on its own, in priority order, at the strict threshold
//! 2. all tiers merged at the relaxed threshold
//! 3. all tiers merged at the emergency threshold
//! 4. web search
//! 5. a structured "no information" answer
//!
//! A phase fails when it retrieves nothing, when synthesis is rejected, or
//! when a collaborator errors. Only configuration errors abort the chain.

use crate::embeddings::EmbeddingProvider;
use crate::rag::synthesize::{AnswerSynthesizer, Synthesis};
use crate::retriever::{Tier, TieredRetriever};
use crate::retry::RetryPolicy;
use crate::types::{
    Answer, Passage, ScoredPassage, COMBINED_EMERGENCY_LABEL, COMBINED_RELAXED_LABEL,
    WEB_SEARCH_LABEL,
};
use crate::web::{WebResult, WebSearchProvider};
use futures::future::join_all;
use kbqa_core::{AppError, AppResult, RetrievalConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Relevance cut-offs for the three local phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub strict: f32,
    pub relaxed: f32,
    pub emergency: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl Thresholds {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            strict: config.strict_threshold,
            relaxed: config.relaxed_threshold,
            emergency: config.emergency_threshold,
        }
    }
}

/// Answers questions by escalating through knowledge tiers.
///
/// Holds only shared handles, so `answer` can run concurrently for
/// several queries on one instance.
pub struct Orchestrator {
    tiers: Vec<Tier>,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<AnswerSynthesizer>,
    web: Option<Arc<dyn WebSearchProvider>>,
    retriever: TieredRetriever,
    thresholds: Thresholds,
    web_max_results: usize,
    query_timeout: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn has_web_search(&self) -> bool {
        self.web.is_some()
    }

    /// Answer `query`, escalating until some phase succeeds.
    ///
    /// "Nothing found" and running out of time are `Ok` answers. `Err` means
    /// an empty query or a configuration problem no tier can work around.
    pub async fn answer(&self, query: &str) -> AppResult<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Other("Query cannot be empty".to_string()));
        }

        let span = tracing::info_span!("query", query = %query);
        async {
            tracing::info!("Answering query");
            match tokio::time::timeout(self.query_timeout, self.escalate(query)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Query timed out after {:?}", self.query_timeout);
                    Ok(Answer::timed_out(query, self.query_timeout))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn escalate(&self, query: &str) -> AppResult<Answer> {
        match self.embedder.embed(query).await {
            Ok(embedding) => {
                if let Some(answer) = self.local_phases(query, &embedding).await? {
                    return Ok(answer);
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, skipping local tiers");
            }
        }

        if let Some(answer) = self.web_fallback(query).await? {
            return Ok(answer);
        }

        tracing::info!("All phases exhausted, no answer");
        Ok(Answer::no_information(query))
    }

    async fn local_phases(&self, query: &str, embedding: &[f32]) -> AppResult<Option<Answer>> {
        // Tiers without a usable index are not searched again for this query
        let mut unavailable: HashSet<&str> = HashSet::new();

        for tier in &self.tiers {
            tracing::info!(
                tier = %tier.name,
                threshold = self.thresholds.strict,
                "Searching tier"
            );
            let retrieval = self
                .retriever
                .retrieve(tier, embedding, self.thresholds.strict)
                .await;
            if retrieval.is_unavailable() {
                unavailable.insert(tier.name.as_str());
            }
            if retrieval.passages.is_empty() {
                tracing::info!(tier = %tier.name, "No passages above threshold, escalating");
                continue;
            }
            if let Some(answer) = self.try_answer(query, retrieval.passages, &tier.label).await? {
                return Ok(Some(answer));
            }
        }

        let combined = [
            (self.thresholds.relaxed, COMBINED_RELAXED_LABEL),
            (self.thresholds.emergency, COMBINED_EMERGENCY_LABEL),
        ];
        for (threshold, label) in combined {
            tracing::info!(phase = label, threshold, "Searching all tiers");
            let merged = self.retrieve_combined(embedding, threshold, &unavailable).await;
            if merged.is_empty() {
                tracing::info!(phase = label, "No passages above threshold, escalating");
                continue;
            }
            if let Some(answer) = self.try_answer(query, merged, label).await? {
                return Ok(Some(answer));
            }
        }

        Ok(None)
    }

    /// Search every available tier concurrently and merge the results.
    ///
    /// Each passage is tagged with its tier label. The merged list is sorted
    /// by score; the sort is stable, so ties keep tier priority order.
    async fn retrieve_combined(
        &self,
        embedding: &[f32],
        threshold: f32,
        unavailable: &HashSet<&str>,
    ) -> Vec<ScoredPassage> {
        let searches = self
            .tiers
            .iter()
            .filter(|tier| !unavailable.contains(tier.name.as_str()))
            .map(|tier| async move {
                let retrieval = self.retriever.retrieve(tier, embedding, threshold).await;
                (tier, retrieval)
            });

        let mut merged = Vec::new();
        for (tier, retrieval) in join_all(searches).await {
            tracing::debug!(
                tier = %tier.name,
                passages = retrieval.passages.len(),
                "Tier contribution"
            );
            merged.extend(retrieval.passages.into_iter().map(|r| {
                ScoredPassage::new(r.passage.with_metadata("tier", tier.label.as_str()), r.score)
            }));
        }

        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged
    }

    /// Synthesize from ranked passages. `None` means escalate.
    async fn try_answer(
        &self,
        query: &str,
        ranked: Vec<ScoredPassage>,
        label: &str,
    ) -> AppResult<Option<Answer>> {
        let (passages, mut scores): (Vec<Passage>, Vec<f32>) =
            ranked.into_iter().map(|r| (r.passage, r.score)).unzip();

        tracing::info!(
            phase = label,
            passages = passages.len(),
            top_score = scores.first().copied().unwrap_or_default(),
            low_score = scores.last().copied().unwrap_or_default(),
            "Synthesizing answer"
        );

        match self.synthesizer.synthesize(query, &passages).await {
            Ok(Synthesis::Answered { text, passages }) => {
                scores.truncate(passages.len());
                tracing::info!(phase = label, "Answer found");
                Ok(Some(Answer::answered(text, passages, label, scores)))
            }
            Ok(Synthesis::Failed(reason)) => {
                tracing::info!(phase = label, %reason, "Synthesis failed, escalating");
                Ok(None)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(phase = label, error = %e, "Synthesis error, escalating");
                Ok(None)
            }
        }
    }

    async fn web_fallback(&self, query: &str) -> AppResult<Option<Answer>> {
        let Some(web) = &self.web else {
            tracing::info!("Web search not configured, skipping fallback");
            return Ok(None);
        };

        tracing::info!(provider = web.provider_name(), "Falling back to web search");
        let results = match web.search(query, self.web_max_results).await {
            Ok(results) => results,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Web search failed");
                return Ok(None);
            }
        };

        let passages = web_passages(results);
        if passages.is_empty() {
            tracing::info!("Web search returned no results");
            return Ok(None);
        }
        tracing::info!(results = passages.len(), "Synthesizing from web results");

        match self.synthesizer.synthesize(query, &passages).await {
            Ok(Synthesis::Answered { text, passages }) => Ok(Some(Answer::answered(
                text,
                passages,
                WEB_SEARCH_LABEL,
                Vec::new(),
            ))),
            Ok(Synthesis::Failed(reason)) => {
                tracing::info!(%reason, "Could not synthesize from web results, returning sources");
                Ok(Some(Answer::unsynthesized(passages)))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis from web results failed");
                Ok(None)
            }
        }
    }
}

/// Turn web hits into passages, dropping hits with no text.
fn web_passages(results: Vec<WebResult>) -> Vec<Passage> {
    results
        .into_iter()
        .filter_map(|r| {
            Passage::new(
                r.content,
                r.url,
                serde_json::json!({ "title": r.title, "tier": WEB_SEARCH_LABEL }),
            )
            .ok()
        })
        .collect()
}

/// Assembles an [`Orchestrator`] from injected collaborators.
pub struct OrchestratorBuilder {
    tiers: Vec<Tier>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    synthesizer: Option<Arc<AnswerSynthesizer>>,
    web: Option<Arc<dyn WebSearchProvider>>,
    thresholds: Thresholds,
    top_k: usize,
    retry: RetryPolicy,
    web_max_results: usize,
    query_timeout: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            tiers: Vec::new(),
            embedder: None,
            synthesizer: None,
            web: None,
            thresholds: Thresholds::from_config(&defaults),
            top_k: defaults.top_k,
            retry: RetryPolicy::default(),
            web_max_results: 3,
            query_timeout: Duration::from_secs(defaults.query_timeout_secs),
        }
    }
}

impl OrchestratorBuilder {
    /// Append a tier. Tiers are searched in the order they are added.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = Some(Arc::new(synthesizer));
        self
    }

    pub fn web_search(mut self, web: Arc<dyn WebSearchProvider>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn web_max_results(mut self, max_results: usize) -> Self {
        self.web_max_results = max_results.max(1);
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Thresholds, top-k, retry and timeout from retrieval config.
    pub fn retrieval_config(mut self, config: &RetrievalConfig) -> Self {
        self.thresholds = Thresholds::from_config(config);
        self.top_k = config.top_k;
        self.retry = RetryPolicy::fixed(
            config.index_retry_attempts,
            Duration::from_millis(config.index_retry_delay_ms),
        )
        .with_backoff(config.index_retry_backoff);
        self.query_timeout = Duration::from_secs(config.query_timeout_secs);
        self
    }

    pub fn build(self) -> AppResult<Orchestrator> {
        let embedder = self
            .embedder
            .ok_or_else(|| AppError::Config("No embedding provider configured".to_string()))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| AppError::Config("No answer synthesizer configured".to_string()))?;

        if self.tiers.is_empty() {
            tracing::warn!("No knowledge tiers configured, only web search can answer");
        }

        Ok(Orchestrator {
            tiers: self.tiers,
            embedder,
            synthesizer,
            web: self.web,
            retriever: TieredRetriever::new(self.top_k, self.retry),
            thresholds: self.thresholds,
            web_max_results: self.web_max_results,
            query_timeout: self.query_timeout,
        })
    }
}
