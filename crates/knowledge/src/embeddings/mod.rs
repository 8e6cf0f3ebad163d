//! Embedding providers.
//!
//! The same provider must embed both the ingested passages and the queries
//! of a tier, otherwise similarity scores are meaningless.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
