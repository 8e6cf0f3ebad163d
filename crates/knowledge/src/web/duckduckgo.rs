//! DuckDuckGo Instant Answer API. Needs no API key.

use super::{status_error, WebResult, WebSearchProvider};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use serde_json::Value;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com";

pub struct DuckDuckGoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl DuckDuckGoProvider {
    pub fn new(endpoint: Option<&str>) -> Self {
        Self {
            base_url: endpoint
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// Pull abstract, direct results and (nested) related topics, in that order.
fn extract_results(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = payload
        .get("AbstractText")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let abstract_url = payload
        .get("AbstractURL")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = payload
            .get("Heading")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .unwrap_or(abstract_text);
        results.push(WebResult {
            title: heading.to_string(),
            url: abstract_url.to_string(),
            content: abstract_text.to_string(),
        });
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }

    results
}

fn extract_topics(items: &[Value], results: &mut Vec<WebResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            content: text.to_string(),
        });
    }
}

#[async_trait]
impl WebSearchProvider for DuckDuckGoProvider {
    fn provider_name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        tracing::debug!("Sending DuckDuckGo search request");

        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Failed to send DuckDuckGo request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("DuckDuckGo", status, &text));
        }

        let payload: Value = response.json().await.map_err(|e| {
            AppError::Search(format!("Failed to parse DuckDuckGo response: {}", e))
        })?;

        let mut results = extract_results(&payload);
        results.truncate(max_results);
        Ok(results)
    }
}
