//! Prompt system for kbqa.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions (`.kbqa/prompts/<id>.yml`)
//! - Handlebars template rendering
//! - Built-in defaults so a fresh workspace answers questions without setup

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{builtin_prompt, RAG_ANSWER_PROMPT_ID};
pub use loader::{load_prompt, load_prompt_or_default};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
