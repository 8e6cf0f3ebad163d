//! Fetching web pages into plain text for a knowledge tier.
//!
//! A page is fetched once, stripped down to its visible text with
//! [`parser::clean_html`], and handed to ingestion like any other source.
//! The cleaned text is also kept under the tier's `scraped_content/`
//! directory so what was learned can be inspected later.

use crate::parser;
use kbqa_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; kbqa/0.1)";

/// Budget for one page fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Visible text of one web page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl ScrapedPage {
    /// Build a page from raw HTML. The title falls back to the URL.
    pub fn from_html(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            title: parser::html_title(html).unwrap_or_else(|| url.to_string()),
            text: parser::clean_html(html),
        }
    }
}

/// HTTP fetcher for web pages.
pub struct PageScraper {
    client: reqwest::Client,
}

impl PageScraper {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::Knowledge(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch a page and extract its visible text.
    ///
    /// Invalid URLs, transport failures and non-success statuses are
    /// `AppError::Knowledge`: one bad page never aborts a learn run.
    pub async fn fetch(&self, url: &str) -> AppResult<ScrapedPage> {
        let parsed = validate_url(url)?;

        tracing::debug!("Fetching {}", parsed);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Knowledge(format!(
                "Fetching {} returned {}",
                url, status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to read {}: {}", url, e)))?;

        Ok(ScrapedPage::from_html(url, &html))
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> AppResult<reqwest::Url> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| AppError::Knowledge(format!("Invalid URL {:?}: {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::Knowledge(format!("Invalid URL {:?}", url)));
    }

    Ok(parsed)
}

/// URLs from a list file: one per line, blank lines and `#` comments skipped.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Keep the cleaned text of a page as `<dir>/<hash>.txt`.
pub fn save_page_text(dir: &Path, hash: &str, text: &str) -> AppResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        AppError::Knowledge(format!("Failed to create {:?}: {}", dir, e))
    })?;

    let path = dir.join(format!("{}.txt", hash));
    std::fs::write(&path, text)
        .map_err(|e| AppError::Knowledge(format!("Failed to write {:?}: {}", path, e)))?;

    Ok(path)
}
