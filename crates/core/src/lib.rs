//! kbqa Core Library
//!
//! This crate provides the foundational utilities shared by every kbqa crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (LLM, embedding, retrieval, web search, tiers)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, RetrievalConfig, TierConfig, WebSearchConfig};
pub use error::{AppError, AppResult};
