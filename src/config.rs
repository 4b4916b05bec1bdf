//! Configuration objects for the trading agent
//!
//! Everything is constructed explicitly at INIT and handed to the
//! orchestrator; there is no ambient global state.

use crate::error::{AgentError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// Assets the session must never trade, regardless of what the model says.
pub const DEFAULT_FORBIDDEN_ASSETS: [&str; 4] = ["SOL", "SUI", "BTC", "ETH"];

/// Configuration for the local Ollama model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            endpoint: "http://localhost:11434/api/generate".to_string(),
            temperature: 0.2,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The fixed safety envelope for a session.
#[derive(Debug, Clone)]
pub struct TradingConstraints {
    pub max_runtime: chrono::Duration,
    pub profit_target_usdc: Decimal,
    pub max_trades: u32,
    pub max_buy_usdc: Decimal,
    pub forbidden_assets: Vec<String>,
}

impl Default for TradingConstraints {
    fn default() -> Self {
        Self {
            max_runtime: chrono::Duration::hours(5),
            profit_target_usdc: dec!(50),
            max_trades: 15,
            max_buy_usdc: dec!(200),
            forbidden_assets: DEFAULT_FORBIDDEN_ASSETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TradingConstraints {
    /// Envelope summary forwarded to the model each cycle. Session
    /// headroom (trades used, profit so far) reaches the model through
    /// the journal context, which records every fill.
    pub fn prompt_payload(&self) -> serde_json::Value {
        json!({
            "max_runtime_hours": self.max_runtime.num_hours(),
            "profit_target_usdc": self.profit_target_usdc,
            "max_trades": self.max_trades,
            "max_buy_usdc": self.max_buy_usdc,
            "forbidden_assets": self.forbidden_assets,
        })
    }
}

/// Where session journal files are written.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub extension: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("journals"),
            prefix: "journal".to_string(),
            extension: ".md".to_string(),
        }
    }
}

/// Aggregate configuration for one session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub constraints: TradingConstraints,
    pub journal: JournalConfig,
    pub poll_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            constraints: TradingConstraints::default(),
            journal: JournalConfig::default(),
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(AgentError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.constraints.max_trades == 0 {
            return Err(AgentError::Config(
                "max trade count must be positive".to_string(),
            ));
        }
        if self.constraints.max_buy_usdc <= Decimal::ZERO {
            return Err(AgentError::Config(
                "buy cap must be a positive USDC amount".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::Config("model name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Exchange API credentials, loaded from the environment at INIT.
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ExchangeCredentials {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COINBASE_API_KEY")
            .map_err(|_| AgentError::Config("COINBASE_API_KEY is not set".to_string()))?;
        let api_secret = std::env::var("COINBASE_API_SECRET")
            .map_err(|_| AgentError::Config("COINBASE_API_SECRET is not set".to_string()))?;

        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            return Err(AgentError::Config(
                "exchange credentials must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            api_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_envelope_matches_session_limits() {
        let constraints = TradingConstraints::default();
        assert_eq!(constraints.max_runtime, chrono::Duration::hours(5));
        assert_eq!(constraints.profit_target_usdc, dec!(50));
        assert_eq!(constraints.max_trades, 15);
        assert_eq!(constraints.max_buy_usdc, dec!(200));
        assert_eq!(constraints.forbidden_assets, ["SOL", "SUI", "BTC", "ETH"]);
    }

    #[test]
    fn prompt_payload_carries_the_envelope() {
        let constraints = TradingConstraints::default();
        let payload = constraints.prompt_payload();

        assert_eq!(payload["max_runtime_hours"], 5);
        assert_eq!(payload["max_trades"], 15);
        assert_eq!(payload["forbidden_assets"][0], "SOL");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = AgentConfig {
            poll_interval: Duration::ZERO,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
