//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a concrete client.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiCompatClient};
use crate::types::ProviderType;
use kbqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "together", "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key (required by hosted providers)
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required key
/// is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let base_url = endpoint.unwrap_or(provider_type.default_endpoint());

    match provider_type {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url))),
        ProviderType::Together | ProviderType::OpenAI => {
            let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                AppError::Config(format!(
                    "{} provider requires API key",
                    provider_type.as_str()
                ))
            })?;
            Ok(Arc::new(OpenAiCompatClient::new(
                provider_type.as_str(),
                base_url,
                api_key,
            )))
        }
    }
}
