//! LLM provider implementations.

pub mod ollama;
pub mod openai_compat;

pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;

use kbqa_core::AppError;
use reqwest::StatusCode;

/// Map a non-success HTTP status to an error.
///
/// Rejected credentials are configuration errors: retrying the same request
/// against another knowledge tier cannot fix them.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Config(format!(
            "{} rejected the API credentials ({}): {}",
            provider, status, body
        )),
        _ => AppError::Llm(format!("{} API error ({}): {}", provider, status, body)),
    }
}
