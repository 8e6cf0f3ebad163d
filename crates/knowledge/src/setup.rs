//! Wiring of the answer engine from configuration.

use crate::config::get_index_path;
use crate::embeddings::create_provider;
use crate::index::SqliteIndex;
use crate::rag::{AnswerSynthesizer, Orchestrator};
use crate::retriever::Tier;
use crate::web::create_web_provider;
use kbqa_core::{AppConfig, AppResult};
use kbqa_llm::create_client;
use kbqa_prompt::{load_prompt_or_default, RAG_ANSWER_PROMPT_ID};
use std::sync::Arc;

/// Build an [`Orchestrator`] for the configured tiers and providers.
///
/// Clients are created once here and shared by every query. Nothing is
/// contacted yet: a tier whose index does not exist is simply empty at
/// query time.
pub fn build_orchestrator(config: &AppConfig) -> AppResult<Orchestrator> {
    config.validate()?;

    let endpoint = config
        .get_provider_config(&config.provider)
        .and_then(|p| p.endpoint().map(str::to_string));
    let api_key = config.resolve_api_key(&config.provider);
    let llm = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())?;

    let prompt = load_prompt_or_default(&config.workspace, RAG_ANSWER_PROMPT_ID)?;
    let synthesizer = AnswerSynthesizer::new(llm, config.model.as_str(), prompt)
        .with_retrieval_config(&config.retrieval);

    let mut builder = Orchestrator::builder()
        .embedder(create_provider(&config.embedding)?)
        .synthesizer(synthesizer)
        .retrieval_config(&config.retrieval)
        .web_max_results(config.web_search.max_results);

    for tier in &config.tiers {
        let index = SqliteIndex::new(get_index_path(&config.storage_dir, tier));
        builder = builder.tier(Tier::new(tier.name.as_str(), tier.label.as_str(), Arc::new(index)));
    }

    if let Some(web) = create_web_provider(&config.web_search)? {
        builder = builder.web_search(web);
    }

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        tiers = config.tiers.len(),
        "Answer engine configured"
    );

    builder.build()
}
