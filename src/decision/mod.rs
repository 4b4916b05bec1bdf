//! Decision provider trait and implementations
//!
//! The provider turns journal context + live market snapshot into one
//! structured decision. Parsing is strict: a reply that does not map
//! onto buy/sell/hold is an error, never a guessed action.

use crate::models::{Decision, MarketSnapshot};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod ollama;
pub use ollama::OllamaProvider;

/// Trait for decision generation (LLM controlled)
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Ask the model for one decision given the rendered journal and
    /// the current market snapshot. Exactly one request per cycle.
    async fn decide(&self, context: &str, snapshot: &MarketSnapshot) -> Result<Decision>;
}

/// Scriptable provider for development & testing.
/// Replays a fixed sequence of outcomes, then holds forever.
pub struct MockDecisionProvider {
    script: Mutex<VecDeque<Result<Decision>>>,
}

impl MockDecisionProvider {
    pub fn new(script: Vec<Result<Decision>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl DecisionProvider for MockDecisionProvider {
    async fn decide(&self, _context: &str, _snapshot: &MarketSnapshot) -> Result<Decision> {
        let mut script = self.script.lock().expect("mock script lock poisoned");
        script
            .pop_front()
            .unwrap_or_else(|| Ok(Decision::hold("script exhausted")))
    }
}
