//! Tavily search API.
//!
//! API: https://docs.tavily.com/docs/rest-api/api-reference

use super::{status_error, WebResult, WebSearchProvider};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

pub struct TavilyProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TavilyProvider {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: endpoint
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// Keep hits that have both a URL and some text.
fn to_results(response: TavilyResponse) -> Vec<WebResult> {
    response
        .results
        .into_iter()
        .filter(|hit| !hit.url.is_empty() && !hit.content.trim().is_empty())
        .map(|hit| WebResult {
            title: hit.title,
            url: hit.url,
            content: hit.content,
        })
        .collect()
}

#[async_trait]
impl WebSearchProvider for TavilyProvider {
    fn provider_name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        let url = format!("{}/search", self.base_url);
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
        };

        tracing::debug!("Sending Tavily search request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Failed to send Tavily request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Tavily", status, &text));
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Failed to parse Tavily response: {}", e)))?;

        let mut results = to_results(payload);
        results.truncate(max_results);
        Ok(results)
    }
}
