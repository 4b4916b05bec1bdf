//! Ollama-backed decision provider
//!
//! One bounded request per cycle against the local Ollama generate API.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::{LlmConfig, TradingConstraints};
use crate::error::AgentError;
use crate::models::{Decision, DecisionAction, MarketSnapshot};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

pub struct OllamaProvider {
    client: Client,
    config: LlmConfig,
    constraints: TradingConstraints,
}

impl OllamaProvider {
    pub fn new(config: LlmConfig, constraints: TradingConstraints) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            constraints,
        })
    }

    fn build_prompt(&self, context: &str, snapshot: &MarketSnapshot) -> String {
        let constraints_text = serde_json::to_string_pretty(&self.constraints.prompt_payload())
            .unwrap_or_else(|_| "{}".to_string());
        let snapshot_text =
            serde_json::to_string_pretty(snapshot).unwrap_or_else(|_| "{}".to_string());

        format!(
            r#"You are an autonomous crypto trading strategist.

Session constraints:
{constraints_text}

Current market snapshot:
{snapshot_text}

Trading journal:
{context}

Respond with strict JSON using the schema:
{{
  "action": "buy" | "sell" | "hold",
  "asset": string | null,
  "quote_amount_usdc": number | null,
  "base_amount": number | null,
  "rationale": string
}}

Buys are sized in USDC via quote_amount_usdc; sells are sized in base asset
units via base_amount. All trading pairs are quoted in USDC. Respect every
constraint. Return "hold" when unsure."#,
        )
    }
}

#[async_trait]
impl super::DecisionProvider for OllamaProvider {
    async fn decide(&self, context: &str, snapshot: &MarketSnapshot) -> Result<Decision> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: self.build_prompt(context, snapshot),
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
            stream: false,
        };

        info!(model = %self.config.model, "Querying decision model");

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::NetworkTimeout(format!(
                        "no response from model within {:?}",
                        self.config.request_timeout
                    ))
                } else {
                    error!("Model request failed: {}", e);
                    AgentError::Llm(format!("model request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!(
                "model API returned {}: {}",
                status, body
            )));
        }

        let reply: OllamaResponse = response.json().await.map_err(|e| {
            AgentError::Llm(format!("malformed model API response: {}", e))
        })?;

        parse_decision(&reply.response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Strictly map a model reply onto a decision.
///
/// Any reply that is not valid JSON, names an unknown action, or lacks a
/// required field is a parse error. The orchestrator downgrades those to
/// a hold, so a confused model can never place an unconstrained order.
pub fn parse_decision(reply: &str) -> Result<Decision> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| AgentError::DecisionParse(format!("non-JSON reply: {} | raw={}", e, reply)))?;

    let action = value
        .get("action")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::DecisionParse("missing action field".to_string()))?
        .to_lowercase();

    let rationale = value
        .get("rationale")
        .and_then(|v| v.as_str())
        .unwrap_or("No rationale provided.")
        .to_string();

    let decision = match action.as_str() {
        "hold" => Decision::hold(rationale),
        "buy" => {
            let (asset, quote_currency) = required_asset(&value)?;
            let quote_amount = required_amount(&value, "quote_amount_usdc")?;
            Decision {
                action: DecisionAction::Buy {
                    asset,
                    quote_amount,
                },
                quote_currency,
                rationale,
                decided_at: Utc::now(),
            }
        }
        "sell" => {
            let (asset, quote_currency) = required_asset(&value)?;
            let base_amount = required_amount(&value, "base_amount")?;
            Decision {
                action: DecisionAction::Sell { asset, base_amount },
                quote_currency,
                rationale,
                decided_at: Utc::now(),
            }
        }
        other => {
            return Err(AgentError::DecisionParse(format!(
                "unsupported action: {}",
                other
            )))
        }
    };

    Ok(decision)
}

/// Extract the asset symbol, splitting off an explicit quote suffix when
/// the model answered with a full product pair ("DOGE-USD").
fn required_asset(value: &serde_json::Value) -> Result<(String, String)> {
    let raw = value
        .get("asset")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::DecisionParse("trade without an asset".to_string()))?
        .to_uppercase();

    match raw.split_once('-') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
            Ok((base.to_string(), quote.to_string()))
        }
        Some(_) => Err(AgentError::DecisionParse(format!(
            "malformed product id: {}",
            raw
        ))),
        None => Ok((raw, "USDC".to_string())),
    }
}

fn required_amount(value: &serde_json::Value, field: &str) -> Result<Decimal> {
    let amount = match value.get(field) {
        Some(serde_json::Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .map_err(|e| AgentError::DecisionParse(format!("invalid {}: {}", field, e)))?,
        Some(serde_json::Value::String(s)) => s
            .parse::<Decimal>()
            .map_err(|e| AgentError::DecisionParse(format!("invalid {}: {}", field, e)))?,
        _ => {
            return Err(AgentError::DecisionParse(format!(
                "missing {} for trade",
                field
            )))
        }
    };

    if amount <= Decimal::ZERO {
        return Err(AgentError::DecisionParse(format!(
            "{} must be positive, got {}",
            field, amount
        )));
    }

    Ok(amount)
}
