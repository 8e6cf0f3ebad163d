//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use kbqa_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and the user templates are rendered with the same
/// variables.
///
/// # Example
/// ```no_run
/// use kbqa_prompt::{build_prompt, builtin_prompt, RAG_ANSWER_PROMPT_ID};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = builtin_prompt(RAG_ANSWER_PROMPT_ID).unwrap();
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "What is Rust?".to_string());
/// vars.insert("context".to_string(), "Rust is a systems language.".to_string());
///
/// let built = build_prompt(&def, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, variables))
        .transpose()?;

    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Passages are plain text, never HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}
