//! Stats command handler.

use clap::Args;
use kbqa_core::{config::AppConfig, AppResult};
use kbqa_knowledge::TierStats;

/// Show knowledge tier statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let tiers = kbqa_knowledge::stats(config)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&tiers)?);
        } else {
            for tier in &tiers {
                println!("{}", format_tier(tier));
            }
        }

        Ok(())
    }
}

fn format_tier(tier: &TierStats) -> String {
    if !tier.index_exists {
        return format!("{} ({}): no index", tier.label, tier.tier);
    }

    let last = tier
        .last_learn_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} ({}): {} passages from {} sources, {} KiB, last learned {}",
        tier.label,
        tier.tier,
        tier.passages_count,
        tier.sources_count,
        tier.index_size_bytes / 1024,
        last
    )
}
