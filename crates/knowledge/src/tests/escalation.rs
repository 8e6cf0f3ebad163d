//! Escalation behaviour of the orchestrator, driven by counting mocks.

use crate::embeddings::EmbeddingProvider;
use crate::rag::{AnswerSynthesizer, Orchestrator, OrchestratorBuilder};
use crate::retriever::Tier;
use crate::retry::RetryPolicy;
use crate::types::{
    AnswerOutcome, Passage, ScoredPassage, COMBINED_EMERGENCY_LABEL, COMBINED_RELAXED_LABEL,
    NO_ANSWER_LABEL, WEB_SEARCH_LABEL,
};
use crate::vector_index::VectorIndex;
use crate::web::{WebResult, WebSearchProvider};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use kbqa_llm::{LlmClient, LlmRequest, LlmResponse};
use kbqa_prompt::{builtin_prompt, RAG_ANSWER_PROMPT_ID};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GOOD_ANSWER: &str = "Digital India is a programme to transform India into a digitally empowered society.";
const NO_INFO: &str = "I do not have enough information to answer this question.";

/// Index returning canned scores regardless of the query.
struct CannedIndex {
    present: bool,
    corrupt: bool,
    results: Vec<ScoredPassage>,
    exists_calls: AtomicU32,
    searches: AtomicU32,
}

impl CannedIndex {
    fn build(tier: &str, scores: &[f32], present: bool, corrupt: bool) -> Arc<Self> {
        let results = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                let passage = Passage::new(
                    format!("{} passage {}", tier, i + 1),
                    format!("{}/{}.txt", tier, i + 1),
                    serde_json::json!({}),
                )
                .unwrap();
                ScoredPassage::new(passage, score)
            })
            .collect();
        Arc::new(Self {
            present,
            corrupt,
            results,
            exists_calls: AtomicU32::new(0),
            searches: AtomicU32::new(0),
        })
    }

    fn with_scores(tier: &str, scores: &[f32]) -> Arc<Self> {
        Self::build(tier, scores, true, false)
    }

    fn absent() -> Arc<Self> {
        Self::build("absent", &[], false, false)
    }

    fn corrupt() -> Arc<Self> {
        Self::build("corrupt", &[], true, true)
    }

    fn searches(&self) -> u32 {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CannedIndex {
    async fn exists(&self) -> bool {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.present
    }

    async fn search(&self, _query: &[f32], top_k: usize) -> AppResult<Vec<ScoredPassage>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.corrupt {
            return Err(AppError::Knowledge("malformed index".to_string()));
        }
        Ok(self.results.iter().take(top_k).cloned().collect())
    }
}

#[derive(Debug)]
struct FixedEmbedder {
    fail: Option<fn() -> AppError>,
    calls: AtomicU32,
}

impl FixedEmbedder {
    fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: None,
            calls: AtomicU32::new(0),
        })
    }

    fn failing(error: fn() -> AppError) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(error),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed-v1"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail {
            Some(error) => Err(error()),
            None => Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()),
        }
    }
}

type Reply = Box<dyn Fn(&str) -> AppResult<String> + Send + Sync>;

/// LLM whose reply depends on the prompt it receives.
struct ScriptedLlm {
    reply: Reply,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedLlm {
    fn new(reply: impl Fn(&str) -> AppResult<String> + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    fn with_delay(
        reply: impl Fn(&str) -> AppResult<String> + Send + Sync + 'static,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    fn always(text: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(text.to_string()))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = (self.reply)(&request.prompt)?;
        Ok(LlmResponse::new(text, "scripted-model"))
    }
}

struct CannedWeb {
    results: AppResult<Vec<WebResult>>,
    calls: AtomicU32,
    requested: AtomicU32,
}

impl CannedWeb {
    fn returning(count: usize) -> Arc<Self> {
        let results = (1..=count)
            .map(|i| WebResult {
                title: format!("Result {}", i),
                url: format!("https://example.org/{}", i),
                content: format!("web content {}", i),
            })
            .collect();
        Arc::new(Self {
            results: Ok(results),
            calls: AtomicU32::new(0),
            requested: AtomicU32::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            results: Err(AppError::Search("502 Bad Gateway".to_string())),
            calls: AtomicU32::new(0),
            requested: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchProvider for CannedWeb {
    fn provider_name(&self) -> &str {
        "canned"
    }

    async fn search(&self, _query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.store(max_results as u32, Ordering::SeqCst);
        match &self.results {
            Ok(results) => Ok(results.iter().take(max_results).cloned().collect()),
            Err(e) => Err(AppError::Search(e.to_string())),
        }
    }
}

/// Documents, Web and YouTube tiers over the given indexes.
fn builder(
    indexes: [Arc<CannedIndex>; 3],
    llm: Arc<ScriptedLlm>,
    embedder: Arc<FixedEmbedder>,
) -> OrchestratorBuilder {
    let [documents, scraped, youtube] = indexes;
    let prompt = builtin_prompt(RAG_ANSWER_PROMPT_ID).unwrap();
    Orchestrator::builder()
        .tier(Tier::new("documents", "Documents", documents))
        .tier(Tier::new("scraped", "Web", scraped))
        .tier(Tier::new("youtube", "YouTube", youtube))
        .embedder(embedder)
        .synthesizer(AnswerSynthesizer::new(llm, "scripted-model", prompt))
        .retry_policy(RetryPolicy::no_wait())
}

fn empty_tiers() -> [Arc<CannedIndex>; 3] {
    [
        CannedIndex::with_scores("documents", &[0.2]),
        CannedIndex::with_scores("scraped", &[0.1]),
        CannedIndex::with_scores("youtube", &[]),
    ]
}

const QUERY: &str = "What is Digital India?";

#[tokio::test]
async fn test_strict_hit_in_first_tier_stops_escalation() {
    let documents = CannedIndex::with_scores("documents", &[0.85]);
    let scraped = CannedIndex::with_scores("scraped", &[0.9]);
    let youtube = CannedIndex::with_scores("youtube", &[0.9]);
    let llm = ScriptedLlm::always(GOOD_ANSWER);
    let web = CannedWeb::returning(2);

    let orchestrator = builder(
        [documents.clone(), scraped.clone(), youtube.clone()],
        llm.clone(),
        FixedEmbedder::working(),
    )
    .web_search(web.clone())
    .build()
    .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, "Documents");
    assert_eq!(answer.text, GOOD_ANSWER);
    assert_eq!(answer.outcome, AnswerOutcome::Answered);
    assert_eq!(answer.source_passages[0].content(), "documents passage 1");
    assert_eq!(answer.similarity_scores, vec![0.85]);
    assert_eq!(documents.searches(), 1);
    assert_eq!(scraped.searches(), 0);
    assert_eq!(youtube.searches(), 0);
    assert_eq!(web.calls(), 0);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_failed_synthesis_escalates_to_next_tier() {
    let llm = ScriptedLlm::new(|prompt| {
        if prompt.contains("documents passage") {
            Ok(NO_INFO.to_string())
        } else {
            Ok(GOOD_ANSWER.to_string())
        }
    });
    let youtube = CannedIndex::with_scores("youtube", &[0.95]);

    let orchestrator = builder(
        [
            CannedIndex::with_scores("documents", &[0.8]),
            CannedIndex::with_scores("scraped", &[0.75]),
            youtube.clone(),
        ],
        llm.clone(),
        FixedEmbedder::working(),
    )
    .build()
    .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, "Web");
    assert_eq!(llm.calls(), 2);
    assert_eq!(youtube.searches(), 0);
}

#[tokio::test]
async fn test_below_strict_reaches_combined_relaxed() {
    let indexes = [
        CannedIndex::with_scores("documents", &[0.6]),
        CannedIndex::with_scores("scraped", &[0.55]),
        CannedIndex::with_scores("youtube", &[0.58]),
    ];
    let llm = ScriptedLlm::always(GOOD_ANSWER);
    let web = CannedWeb::returning(2);

    let orchestrator = builder(indexes, llm.clone(), FixedEmbedder::working())
        .web_search(web.clone())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, COMBINED_RELAXED_LABEL);
    assert_eq!(answer.source_passages.len(), 3);
    let tiers: Vec<&str> = answer
        .source_passages
        .iter()
        .filter_map(|p| p.tier())
        .collect();
    assert_eq!(tiers, vec!["Documents", "YouTube", "Web"]);
    assert_eq!(answer.similarity_scores, vec![0.6, 0.58, 0.55]);
    assert_eq!(llm.calls(), 1);
    assert_eq!(web.calls(), 0);
}

#[tokio::test]
async fn test_emergency_threshold_is_last_local_phase() {
    let indexes = [
        CannedIndex::with_scores("documents", &[0.4]),
        CannedIndex::with_scores("scraped", &[0.2]),
        CannedIndex::with_scores("youtube", &[0.35]),
    ];

    let orchestrator = builder(indexes, ScriptedLlm::always(GOOD_ANSWER), FixedEmbedder::working())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, COMBINED_EMERGENCY_LABEL);
    assert_eq!(answer.source_passages.len(), 2);
}

#[tokio::test]
async fn test_web_fallback_answers_when_local_tiers_are_empty() {
    let llm = ScriptedLlm::always(GOOD_ANSWER);
    let web = CannedWeb::returning(2);

    let orchestrator = builder(empty_tiers(), llm.clone(), FixedEmbedder::working())
        .web_search(web.clone())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, WEB_SEARCH_LABEL);
    assert_eq!(answer.outcome, AnswerOutcome::Answered);
    assert_eq!(answer.source_passages.len(), 2);
    assert_eq!(answer.source_passages[0].source_identifier(), "https://example.org/1");
    assert_eq!(answer.source_passages[0].title(), Some("Result 1"));
    assert!(answer.similarity_scores.is_empty());
    assert_eq!(web.calls(), 1);
    assert_eq!(web.requested.load(Ordering::SeqCst), 3);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_unsynthesized_web_results_are_returned_as_sources() {
    let web = CannedWeb::returning(2);

    let orchestrator = builder(empty_tiers(), ScriptedLlm::always(NO_INFO), FixedEmbedder::working())
        .web_search(web)
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::Unsynthesized);
    assert_eq!(answer.tier_label, WEB_SEARCH_LABEL);
    assert_eq!(answer.source_passages.len(), 2);
    assert!(answer.text.contains("couldn't synthesize"));
}

#[tokio::test]
async fn test_nothing_anywhere_is_a_no_information_answer() {
    let llm = ScriptedLlm::always(GOOD_ANSWER);
    let web = CannedWeb::returning(0);

    let orchestrator = builder(empty_tiers(), llm.clone(), FixedEmbedder::working())
        .web_search(web.clone())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
    assert_eq!(answer.tier_label, NO_ANSWER_LABEL);
    assert!(answer.source_passages.is_empty());
    assert!(!answer.text.is_empty());
    assert_eq!(web.calls(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_web_search_error_is_not_fatal() {
    let orchestrator = builder(empty_tiers(), ScriptedLlm::always(GOOD_ANSWER), FixedEmbedder::working())
        .web_search(CannedWeb::failing())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
}

#[tokio::test]
async fn test_no_web_provider_goes_straight_to_terminal() {
    let orchestrator = builder(empty_tiers(), ScriptedLlm::always(GOOD_ANSWER), FixedEmbedder::working())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
}

#[tokio::test]
async fn test_llm_outage_escalates_through_all_phases() {
    let indexes = [
        CannedIndex::with_scores("documents", &[0.9]),
        CannedIndex::with_scores("scraped", &[0.9]),
        CannedIndex::with_scores("youtube", &[0.9]),
    ];
    let llm = ScriptedLlm::new(|_| Err(AppError::Llm("connection refused".to_string())));

    let orchestrator = builder(indexes, llm.clone(), FixedEmbedder::working())
        .build()
        .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
    // three strict tiers, relaxed, emergency
    assert_eq!(llm.calls(), 5);
}

#[tokio::test]
async fn test_rejected_credentials_abort_the_query() {
    let scraped = CannedIndex::with_scores("scraped", &[0.9]);
    let llm = ScriptedLlm::new(|_| Err(AppError::Config("invalid API key".to_string())));
    let web = CannedWeb::returning(2);

    let orchestrator = builder(
        [
            CannedIndex::with_scores("documents", &[0.9]),
            scraped.clone(),
            CannedIndex::with_scores("youtube", &[]),
        ],
        llm,
        FixedEmbedder::working(),
    )
    .web_search(web.clone())
    .build()
    .unwrap();

    let result = orchestrator.answer(QUERY).await;

    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(scraped.searches(), 0);
    assert_eq!(web.calls(), 0);
}

#[tokio::test]
async fn test_embedding_outage_skips_to_web() {
    let documents = CannedIndex::with_scores("documents", &[0.9]);
    let web = CannedWeb::returning(1);

    let orchestrator = builder(
        [
            documents.clone(),
            CannedIndex::with_scores("scraped", &[]),
            CannedIndex::with_scores("youtube", &[]),
        ],
        ScriptedLlm::always(GOOD_ANSWER),
        FixedEmbedder::failing(|| AppError::Knowledge("embedding server down".to_string())),
    )
    .web_search(web.clone())
    .build()
    .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, WEB_SEARCH_LABEL);
    assert_eq!(documents.searches(), 0);
    assert_eq!(web.calls(), 1);
}

#[tokio::test]
async fn test_embedding_config_error_is_fatal() {
    let orchestrator = builder(
        empty_tiers(),
        ScriptedLlm::always(GOOD_ANSWER),
        FixedEmbedder::failing(|| AppError::Config("model not pulled".to_string())),
    )
    .build()
    .unwrap();

    assert!(matches!(
        orchestrator.answer(QUERY).await,
        Err(AppError::Config(_))
    ));
}

#[tokio::test]
async fn test_query_embedding_computed_once() {
    let embedder = FixedEmbedder::working();

    let orchestrator = builder(empty_tiers(), ScriptedLlm::always(GOOD_ANSWER), embedder.clone())
        .build()
        .unwrap();

    orchestrator.answer(QUERY).await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_tiers_are_not_revisited() {
    let youtube = CannedIndex::absent();
    let corrupt = CannedIndex::corrupt();

    let orchestrator = builder(
        [
            CannedIndex::with_scores("documents", &[0.6]),
            corrupt.clone(),
            youtube.clone(),
        ],
        ScriptedLlm::always(GOOD_ANSWER),
        FixedEmbedder::working(),
    )
    .build()
    .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.tier_label, COMBINED_RELAXED_LABEL);
    assert_eq!(answer.source_passages.len(), 1);
    assert_eq!(youtube.exists_calls.load(Ordering::SeqCst), 1);
    assert_eq!(youtube.searches(), 0);
    assert_eq!(corrupt.searches(), 1);
}

#[tokio::test]
async fn test_query_timeout_yields_timed_out_answer() {
    let llm = ScriptedLlm::with_delay(|_| Ok(GOOD_ANSWER.to_string()), Duration::from_secs(5));

    let orchestrator = builder(
        [
            CannedIndex::with_scores("documents", &[0.9]),
            CannedIndex::with_scores("scraped", &[]),
            CannedIndex::with_scores("youtube", &[]),
        ],
        llm,
        FixedEmbedder::working(),
    )
    .query_timeout(Duration::from_millis(50))
    .build()
    .unwrap();

    let answer = orchestrator.answer(QUERY).await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::TimedOut);
    assert!(answer.source_passages.is_empty());
    assert!(answer.text.contains("timed out"));
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let orchestrator = builder(empty_tiers(), ScriptedLlm::always(GOOD_ANSWER), FixedEmbedder::working())
        .build()
        .unwrap();

    assert!(orchestrator.answer("   ").await.is_err());
}

#[tokio::test]
async fn test_concurrent_queries_share_one_orchestrator() {
    let orchestrator = Arc::new(
        builder(
            [
                CannedIndex::with_scores("documents", &[0.85]),
                CannedIndex::with_scores("scraped", &[]),
                CannedIndex::with_scores("youtube", &[]),
            ],
            ScriptedLlm::always(GOOD_ANSWER),
            FixedEmbedder::working(),
        )
        .build()
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.answer(&format!("question {}", i)).await })
        })
        .collect();

    for handle in handles {
        let answer = handle.await.unwrap().unwrap();
        assert_eq!(answer.tier_label, "Documents");
    }
}

#[test]
fn test_builder_requires_embedder_and_synthesizer() {
    let prompt = builtin_prompt(RAG_ANSWER_PROMPT_ID).unwrap();

    let missing_embedder = Orchestrator::builder()
        .synthesizer(AnswerSynthesizer::new(
            ScriptedLlm::always(GOOD_ANSWER),
            "m",
            prompt,
        ))
        .build();
    assert!(matches!(missing_embedder, Err(AppError::Config(_))));

    let missing_synthesizer = Orchestrator::builder()
        .embedder(FixedEmbedder::working())
        .build();
    assert!(matches!(missing_synthesizer, Err(AppError::Config(_))));
}
