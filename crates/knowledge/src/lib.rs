//! Tiered knowledge base: ingestion, retrieval and answering.
//!
//! Each tier is an on-disk SQLite vector index. Questions are answered by
//! [`Orchestrator`], which escalates from the highest-priority tier to
//! merged searches and finally to web search.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod memory_index;
pub mod parser;
pub mod rag;
pub mod retriever;
pub mod retry;
pub mod scraper;
pub mod session;
pub mod setup;
pub mod sources;
pub mod types;
pub mod vector_index;
pub mod web;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use rag::{AnswerSynthesizer, FailureClassifier, Orchestrator, OrchestratorBuilder};
pub use retriever::{Tier, TieredRetriever};
pub use retry::RetryPolicy;
pub use session::QuerySession;
pub use setup::build_orchestrator;
pub use types::{
    Answer, AnswerOutcome, KnowledgeSource, LearnOptions, LearnStats, Passage, ScoredPassage,
    TierStats,
};
pub use vector_index::VectorIndex;

use chrono::Utc;
use embeddings::{create_provider, EmbeddingProvider};
use kbqa_core::{AppConfig, AppError, AppResult, TierConfig};
use scraper::{PageScraper, ScrapedPage};
use sources::{content_hash, SourceManager};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Cleaned text of one source, ready to chunk.
struct SourceText {
    /// File path or page URL, stored as the passage source identifier
    identifier: String,
    /// Short name stored as `metadata.source`
    name: String,
    title: String,
    text: String,
}

impl SourceText {
    fn from_file(path: &Path) -> AppResult<Self> {
        let text = parser::parse_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());

        Ok(Self {
            identifier: path.display().to_string(),
            name,
            title,
            text,
        })
    }
}

impl From<ScrapedPage> for SourceText {
    fn from(page: ScrapedPage) -> Self {
        Self {
            identifier: page.url.clone(),
            name: page.url,
            title: page.title,
            text: page.text,
        }
    }
}

/// What happened to one source during ingestion.
enum SourceOutcome {
    Ingested { chunks: u32, bytes: u64 },
    Skipped,
}

/// Shared state of one learn run.
struct Ingestion<'a> {
    conn: rusqlite::Connection,
    embedder: &'a dyn EmbeddingProvider,
    sources: SourceManager,
    known: HashSet<String>,
    options: &'a LearnOptions,
    sources_count: u32,
    skipped_count: u32,
    chunks_count: u32,
    bytes_processed: u64,
}

/// Learn from files and web pages and append them to a tier's index.
///
/// Sources whose cleaned text was already ingested into the tier are
/// skipped. A file that cannot be read or a page that cannot be fetched is
/// logged and skipped; configuration errors abort the run.
pub async fn learn(config: &AppConfig, options: LearnOptions) -> AppResult<LearnStats> {
    learn_with_scraper(config, options, &PageScraper::new()?).await
}

pub(crate) async fn learn_with_scraper(
    config: &AppConfig,
    options: LearnOptions,
    scraper: &PageScraper,
) -> AppResult<LearnStats> {
    let start = Instant::now();

    let tier = config
        .tier(&options.tier)
        .ok_or_else(|| AppError::Config(format!("Unknown tier: {}", options.tier)))?;

    tracing::info!("Starting learn operation for tier '{}'", tier.name);

    let embedder = create_provider(&config.embedding)?;
    let conn = index::init_index(&config::get_index_path(&config.storage_dir, tier))?;
    let sources = SourceManager::new(config::get_sources_path(&config.storage_dir, tier));

    if options.reset {
        tracing::info!("Resetting tier '{}'", tier.name);
        index::reset_index(&conn)?;
        sources.clear_sources()?;
    }

    let mut run = Ingestion {
        known: sources.known_hashes()?,
        conn,
        embedder: embedder.as_ref(),
        sources,
        options: &options,
        sources_count: 0,
        skipped_count: 0,
        chunks_count: 0,
        bytes_processed: 0,
    };

    for path in collect_files(&options.paths) {
        tracing::debug!("Processing file: {:?}", path);
        let outcome = match SourceText::from_file(&path) {
            Ok(source) => run.ingest(source, None).await,
            Err(e) => Err(e),
        };
        run.record(&path.display().to_string(), outcome)?;
    }

    if !options.urls.is_empty() {
        let page_dir = config::get_scraped_content_dir(&config.storage_dir, tier);
        for url in &options.urls {
            let outcome = match scraper.fetch(url).await {
                Ok(page) => run.ingest(SourceText::from(page), Some(page_dir.as_path())).await,
                Err(e) => Err(e),
            };
            run.record(url, outcome)?;
        }
    }

    let duration = start.elapsed();

    tracing::info!(
        "Learn operation completed: {} sources ({} skipped), {} passages, {} bytes in {:.2}s",
        run.sources_count,
        run.skipped_count,
        run.chunks_count,
        run.bytes_processed,
        duration.as_secs_f64()
    );

    Ok(LearnStats {
        tier: tier.name.clone(),
        sources_count: run.sources_count,
        skipped_count: run.skipped_count,
        chunks_count: run.chunks_count,
        bytes_processed: run.bytes_processed,
        duration_secs: duration.as_secs_f64(),
    })
}

/// Expand directories into the files beneath them, sorted for stable order.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }
    files
}

impl Ingestion<'_> {
    /// Count one source's outcome. Only fatal errors stop the run.
    fn record(&mut self, what: &str, outcome: AppResult<SourceOutcome>) -> AppResult<()> {
        match outcome {
            Ok(SourceOutcome::Ingested { chunks, bytes }) => {
                self.sources_count += 1;
                self.chunks_count += chunks;
                self.bytes_processed += bytes;
            }
            Ok(SourceOutcome::Skipped) => self.skipped_count += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!("Skipping {}: {}", what, e),
        }
        Ok(())
    }

    /// Chunk, embed and index one source.
    ///
    /// With `page_dir`, the cleaned text of a new source is also saved there.
    async fn ingest(
        &mut self,
        source: SourceText,
        page_dir: Option<&Path>,
    ) -> AppResult<SourceOutcome> {
        let hash = content_hash(&source.text);
        if self.known.contains(&hash) {
            tracing::info!("Already learned {}, skipping", source.identifier);
            return Ok(SourceOutcome::Skipped);
        }

        let candidates =
            chunker::chunk_text(&source.text, self.options.chunk_size, self.options.chunk_overlap);
        if candidates.is_empty() {
            tracing::debug!("No text in {}, skipping", source.identifier);
            return Ok(SourceOutcome::Skipped);
        }

        if let Some(dir) = page_dir {
            let saved = scraper::save_page_text(dir, &hash, &source.text)?;
            tracing::debug!("Saved page text of {} to {:?}", source.identifier, saved);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != candidates.len() {
            return Err(AppError::Knowledge(format!(
                "Embedder returned {} vectors for {} passages",
                embeddings.len(),
                candidates.len()
            )));
        }

        let source_id = uuid::Uuid::new_v4().to_string();

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;
        for (candidate, embedding) in candidates.iter().zip(&embeddings) {
            let passage = Passage::new(
                candidate.text.as_str(),
                source.identifier.as_str(),
                serde_json::json!({
                    "source": source.name,
                    "title": source.title,
                    "hash": hash,
                    "position": candidate.position,
                }),
            )?;
            index::insert_passage(&tx, &source_id, candidate.position, &passage, embedding)?;
        }
        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit passages: {}", e)))?;

        let chunks = candidates.len() as u32;
        let bytes = source.text.len() as u64;

        self.sources.track_source(&KnowledgeSource {
            source_id,
            path: source.identifier.clone(),
            hash: hash.clone(),
            indexed_at: Utc::now(),
            chunk_count: chunks,
            byte_count: bytes,
        })?;
        self.known.insert(hash);

        tracing::debug!(
            "Processed {}: {} passages, {} bytes",
            source.identifier,
            chunks,
            bytes
        );

        Ok(SourceOutcome::Ingested { chunks, bytes })
    }
}

/// Get statistics for every configured tier, in priority order.
pub fn stats(config: &AppConfig) -> AppResult<Vec<TierStats>> {
    config
        .tiers
        .iter()
        .map(|tier| tier_stats(&config.storage_dir, tier))
        .collect()
}

fn tier_stats(storage: &Path, tier: &TierConfig) -> AppResult<TierStats> {
    let index_path = config::get_index_path(storage, tier);
    let sources = SourceManager::new(config::get_sources_path(storage, tier));
    let last_learn_at = sources
        .list_sources()?
        .into_iter()
        .map(|s| s.indexed_at)
        .max();

    if !index_path.is_file() {
        return Ok(TierStats {
            tier: tier.name.clone(),
            label: tier.label.clone(),
            index_exists: false,
            passages_count: 0,
            sources_count: 0,
            index_size_bytes: 0,
            last_learn_at,
        });
    }

    let conn = index::init_index(&index_path)?;
    let (sources_count, passages_count) = index::get_stats(&conn)?;
    let index_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(TierStats {
        tier: tier.name.clone(),
        label: tier.label.clone(),
        index_exists: true,
        passages_count,
        sources_count,
        index_size_bytes,
        last_learn_at,
    })
}
