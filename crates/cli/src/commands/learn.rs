//! Learn command handler.

use clap::{ArgGroup, Args};
use kbqa_core::{config::AppConfig, AppError, AppResult};
use kbqa_knowledge::{scraper::parse_url_list, LearnOptions};
use std::path::{Path, PathBuf};

/// Learn sources into a knowledge tier
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(true)
        .args(["path", "url", "url_file"])
))]
pub struct LearnCommand {
    /// Tier name (documents, scraped, youtube, or a configured tier)
    pub tier: String,

    /// Files or directories to learn from
    #[arg(long)]
    pub path: Vec<PathBuf>,

    /// Web pages to fetch and learn from
    #[arg(long)]
    pub url: Vec<String>,

    /// File listing web pages, one URL per line
    #[arg(long)]
    pub url_file: Option<PathBuf>,

    /// Clear the tier before learning
    #[arg(long)]
    pub reset: bool,

    /// Chunk size in characters
    #[arg(long, default_value = "1000")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    #[arg(long, default_value = "200")]
    pub chunk_overlap: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl LearnCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing learn command for tier '{}'", self.tier);

        let mut options = LearnOptions::new(self.tier.as_str(), self.path.clone());
        options.urls = self.url.clone();
        if let Some(file) = &self.url_file {
            options.urls.extend(read_url_file(file)?);
        }
        options.reset = self.reset;
        options.chunk_size = self.chunk_size;
        options.chunk_overlap = self.chunk_overlap;

        let stats = kbqa_knowledge::learn(config, options).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!(
                "Learned {} sources into '{}' ({} passages, {} bytes, {} unchanged skipped) in {:.2}s",
                stats.sources_count,
                stats.tier,
                stats.chunks_count,
                stats.bytes_processed,
                stats.skipped_count,
                stats.duration_secs
            );
        }

        Ok(())
    }
}

fn read_url_file(path: &Path) -> AppResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read URL list {:?}: {}", path, e)))?;
    Ok(parse_url_list(&contents))
}
