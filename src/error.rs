//! Error types for the trading agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Fatal Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication rejected by exchange: {0}")]
    FatalAuth(String),

    // =============================
    // Recoverable Cycle Errors
    // =============================

    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Journal error: {0}")]
    Journal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
