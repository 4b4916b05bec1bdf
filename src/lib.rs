//! Trading Agent Orchestrator
//!
//! An LLM-directed but rule-constrained trading session runner:
//! - The model decides *what* to trade; the constraint engine decides whether it may
//! - Every decision, rejection, trade, and system event is journaled
//! - The rendered journal is the model's full context on the next cycle
//! - Hard limits on trade count, buy size, runtime, and tradable assets
//!
//! DECISION CYCLE:
//! FETCH_CONTEXT → QUERY_DECISION → VALIDATE → EXECUTE → RECORD → CHECK_TERMINATION → SLEEP

pub mod agent;
pub mod config;
pub mod constraints;
pub mod decision;
pub mod error;
pub mod exchange;
pub mod journal;
pub mod models;
pub mod state;

pub use error::Result;

// Re-export common types
pub use models::*;
