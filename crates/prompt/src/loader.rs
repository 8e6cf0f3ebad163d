//! Prompt loader for loading YAML prompt definitions.

use crate::defaults::builtin_prompt;
use crate::types::PromptDefinition;
use kbqa_core::{AppError, AppResult};
use std::path::Path;

/// Load a prompt definition by ID from the workspace.
///
/// This function searches for a prompt file named `<id>.yml` in the
/// `.kbqa/prompts/` directory.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.kbqa/`
/// * `prompt_id` - Prompt identifier (e.g., "rag.answer")
///
/// # Example
/// ```no_run
/// use kbqa_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "rag.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".kbqa/prompts")
        .join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::debug!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Load a workspace prompt, falling back to the built-in definition.
///
/// A workspace file that exists but is invalid is still an error: silently
/// ignoring a broken override would hide the mistake.
pub fn load_prompt_or_default(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".kbqa/prompts")
        .join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        return load_prompt(workspace_path, prompt_id);
    }

    builtin_prompt(prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
