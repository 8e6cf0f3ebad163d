//! Retrieval-augmented answering: failure detection, synthesis and tier
//! escalation.

pub mod classify;
pub mod orchestrator;
pub mod synthesize;

pub use classify::{FailureClassifier, FailureReason};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Thresholds};
pub use synthesize::{AnswerSynthesizer, Synthesis};
