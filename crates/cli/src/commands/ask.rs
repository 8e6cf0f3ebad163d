//! Ask command handler.

use clap::Args;
use kbqa_core::{config::AppConfig, AppError, AppResult};
use kbqa_knowledge::{build_orchestrator, Answer};

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Number of sources to list
    #[arg(long, default_value = "5")]
    pub sources: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let question = self.question.join(" ");
        if question.trim().is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }

        tracing::info!("Executing ask command");

        let orchestrator = build_orchestrator(config)?;
        let answer = orchestrator.answer(&question).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            println!("{}", render_answer(&answer, self.sources));
            if config.verbose {
                if let Some(range) = score_range(&answer) {
                    eprintln!("{}", range);
                }
            }
        }

        Ok(())
    }
}

/// Human-readable answer with its origin and top sources.
pub(crate) fn render_answer(answer: &Answer, max_sources: usize) -> String {
    let mut out = answer.text.clone();
    out.push_str(&format!("\n\nSource: {}", answer.tier_label));

    if !answer.source_passages.is_empty() && max_sources > 0 {
        out.push_str("\nSources:");
        for (i, passage) in answer.source_passages.iter().take(max_sources).enumerate() {
            let name = passage.title().unwrap_or_else(|| passage.source_identifier());
            out.push_str(&format!("\n  {}. {}", i + 1, name));
            if passage.title().is_some() {
                out.push_str(&format!(" <{}>", passage.source_identifier()));
            }
            if let Some(score) = answer.similarity_scores.get(i) {
                out.push_str(&format!(" (score {:.3})", score));
            }
            if let Some(tier) = passage.tier() {
                out.push_str(&format!(" [{}]", tier));
            }
        }
    }

    out
}

fn score_range(answer: &Answer) -> Option<String> {
    let first = answer.similarity_scores.first()?;
    let last = answer.similarity_scores.last()?;
    Some(format!(
        "Scores: {:.3} to {:.3} over {} passages",
        first,
        last,
        answer.similarity_scores.len()
    ))
}
