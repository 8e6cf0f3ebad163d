//! Crate-level scenario tests.

mod escalation;
mod ingestion;
