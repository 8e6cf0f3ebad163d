//! LLM integration crate for kbqa.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models (LLMs). The answer synthesizer only ever sees the
//! [`LlmClient`] trait, so providers can be swapped through configuration.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Together AI / OpenAI**: Any OpenAI-compatible chat completions API
//!
//! # Example
//! ```no_run
//! use kbqa_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiCompatClient};
pub use types::ProviderType;
