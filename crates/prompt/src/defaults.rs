//! Built-in prompt definitions.
//!
//! A workspace can override any of these by placing a file with the same id
//! under `.kbqa/prompts/`.

use crate::types::{PromptDefinition, PromptOutputSpec};

/// Prompt used by the answer synthesizer.
///
/// Variables: `context` (joined passage contents) and `question`.
pub const RAG_ANSWER_PROMPT_ID: &str = "rag.answer";

const RAG_ANSWER_SYSTEM: &str = "You are a knowledgeable assistant. Use the following context \
to answer the question strictly from it. If the context does not contain the answer, reply \
exactly: \"I do not have enough information to answer this question.\"";

const RAG_ANSWER_TEMPLATE: &str = "Context:\n{{context}}\n\nQuestion: {{question}}\nAnswer:";

/// Look up a built-in prompt by id.
pub fn builtin_prompt(prompt_id: &str) -> Option<PromptDefinition> {
    match prompt_id {
        RAG_ANSWER_PROMPT_ID => Some(PromptDefinition {
            id: RAG_ANSWER_PROMPT_ID.to_string(),
            title: "Answer a question from retrieved context".to_string(),
            api_version: "1.0".to_string(),
            created_by: "kbqa".to_string(),
            system: Some(RAG_ANSWER_SYSTEM.to_string()),
            template: RAG_ANSWER_TEMPLATE.to_string(),
            output: PromptOutputSpec {
                format: "text".to_string(),
            },
        }),
        _ => None,
    }
}
