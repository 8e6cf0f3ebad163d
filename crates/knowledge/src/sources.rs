//! Source tracking for knowledge tiers.
//!
//! Manages the `sources.jsonl` file that records every ingested source and
//! its content hash, so unchanged content is not ingested twice.

use crate::types::KnowledgeSource;
use kbqa_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Hex-encoded SHA-256 of a source's cleaned text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Manages source tracking for one tier.
pub struct SourceManager {
    sources_path: PathBuf,
}

impl SourceManager {
    /// Create a source manager over the given `sources.jsonl` path.
    pub fn new(sources_path: PathBuf) -> Self {
        Self { sources_path }
    }

    /// Track a new source by appending to sources.jsonl.
    pub fn track_source(&self, source: &KnowledgeSource) -> AppResult<()> {
        if let Some(parent) = self.sources_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sources_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let json_line = serde_json::to_string(source)
            .map_err(|e| AppError::Knowledge(format!("Failed to serialize source: {}", e)))?;

        writeln!(file, "{}", json_line).map_err(|e| {
            AppError::Knowledge(format!("Failed to write to sources.jsonl: {}", e))
        })?;

        file.sync_all()
            .map_err(|e| AppError::Knowledge(format!("Failed to sync sources.jsonl: {}", e)))?;

        tracing::debug!("Tracked source: {}", source.path);
        Ok(())
    }

    /// List all tracked sources.
    pub fn list_sources(&self) -> AppResult<Vec<KnowledgeSource>> {
        if !self.sources_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.sources_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let reader = BufReader::new(file);
        let mut sources = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                AppError::Knowledge(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let source: KnowledgeSource = serde_json::from_str(&line).map_err(|e| {
                AppError::Knowledge(format!(
                    "Failed to parse line {} in sources.jsonl: {}",
                    line_num + 1,
                    e
                ))
            })?;

            sources.push(source);
        }

        tracing::debug!("Listed {} sources from sources.jsonl", sources.len());
        Ok(sources)
    }

    /// Hashes of every tracked source.
    pub fn known_hashes(&self) -> AppResult<HashSet<String>> {
        Ok(self
            .list_sources()?
            .into_iter()
            .map(|source| source.hash)
            .collect())
    }

    /// Clear all tracked sources.
    pub fn clear_sources(&self) -> AppResult<()> {
        if self.sources_path.exists() {
            std::fs::remove_file(&self.sources_path).map_err(|e| {
                AppError::Knowledge(format!("Failed to delete sources.jsonl: {}", e))
            })?;
            tracing::debug!("Cleared sources.jsonl");
        }

        Ok(())
    }
}
