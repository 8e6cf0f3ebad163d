//! Command handlers for the kbqa CLI.

pub mod ask;
pub mod chat;
pub mod learn;
pub mod stats;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use learn::LearnCommand;
pub use stats::StatsCommand;
