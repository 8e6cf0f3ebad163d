//! Chat command handler.
//!
//! Reads questions from stdin until `:quit` or end of input.

use clap::Args;
use kbqa_core::{config::AppConfig, AppResult};
use kbqa_knowledge::{build_orchestrator, QuerySession};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ask::render_answer;

/// Ask questions interactively
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Number of sources to list per answer
    #[arg(long, default_value = "5")]
    pub sources: usize,

    /// Number of exchanges kept for :history
    #[arg(long, default_value = "20")]
    pub history: usize,
}

/// One line of chat input.
#[derive(Debug, PartialEq)]
enum ChatInput<'a> {
    Quit,
    History,
    Blank,
    Question(&'a str),
}

fn parse_input(line: &str) -> ChatInput<'_> {
    match line.trim() {
        "" => ChatInput::Blank,
        ":quit" | ":q" | ":exit" => ChatInput::Quit,
        ":history" => ChatInput::History,
        question => ChatInput::Question(question),
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Starting chat session");

        let orchestrator = build_orchestrator(config)?;
        let mut session = QuerySession::new(self.history);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Ask a question (:history to list, :quit to exit)");
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_input(&line) {
                ChatInput::Quit => break,
                ChatInput::Blank => continue,
                ChatInput::History => {
                    for (i, exchange) in session.history().enumerate() {
                        println!(
                            "{}. {} [{}]",
                            i + 1,
                            exchange.query,
                            exchange.answer.tier_label
                        );
                    }
                }
                ChatInput::Question(question) => match orchestrator.answer(question).await {
                    Ok(answer) => {
                        println!("{}\n", render_answer(&answer, self.sources));
                        session.record(question, answer);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => eprintln!("Error: {}", e),
                },
            }
        }

        tracing::info!("Chat ended after {} questions", session.query_count());
        Ok(())
    }
}
