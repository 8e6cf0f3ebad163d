//! Web search fallback providers.
//!
//! Used only after every local tier has come up empty.

pub mod duckduckgo;
pub mod tavily;

pub use duckduckgo::DuckDuckGoProvider;
pub use tavily::TavilyProvider;

use async_trait::async_trait;
use kbqa_core::{AppError, AppResult, WebSearchConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Trait for web search backends.
///
/// No results is an empty `Vec`, not an error. Errors are transport,
/// status or decoding failures only.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>>;
}

/// Create the configured web search provider.
///
/// Returns `Ok(None)` when web search is disabled, or when the provider
/// needs a key and none is set. An unknown provider is a configuration error.
pub fn create_web_provider(config: &WebSearchConfig) -> AppResult<Option<Arc<dyn WebSearchProvider>>> {
    if !config.enabled {
        tracing::debug!("Web search disabled");
        return Ok(None);
    }

    match config.provider.as_str() {
        "tavily" => match config.resolve_api_key() {
            Some(key) => Ok(Some(Arc::new(TavilyProvider::new(
                key,
                config.endpoint.as_deref(),
            )))),
            None => {
                tracing::warn!(
                    "{} is not set, web search fallback disabled",
                    config.api_key_env
                );
                Ok(None)
            }
        },
        "duckduckgo" => Ok(Some(Arc::new(DuckDuckGoProvider::new(
            config.endpoint.as_deref(),
        )))),
        other => Err(AppError::Config(format!(
            "Unknown web search provider: {}",
            other
        ))),
    }
}

/// Map a non-success search response to an error.
///
/// Rejected keys stay recoverable: the fallback just yields nothing.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    AppError::Search(format!("{} search failed ({}): {}", provider, status, body))
}
