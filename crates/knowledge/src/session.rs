//! Per-conversation query history for interactive front ends.
//!
//! The orchestrator never reads or writes a session.

use crate::types::Answer;
use std::collections::VecDeque;

/// Default number of exchanges kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// One question and the answer it got.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub query: String,
    pub answer: Answer,
}

/// Latest answer plus a bounded history of earlier exchanges.
#[derive(Debug, Clone)]
pub struct QuerySession {
    history: VecDeque<Exchange>,
    capacity: usize,
    query_count: u64,
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl QuerySession {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            query_count: 0,
        }
    }

    /// Record an exchange, evicting the oldest one when full.
    pub fn record(&mut self, query: impl Into<String>, answer: Answer) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            query: query.into(),
            answer,
        });
        self.query_count += 1;
    }

    pub fn latest(&self) -> Option<&Exchange> {
        self.history.back()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    /// Total queries recorded, including evicted ones.
    pub fn query_count(&self) -> u64 {
        self.query_count
    }
}
