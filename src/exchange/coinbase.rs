//! Coinbase Advanced Trade execution provider
//!
//! Market IOC orders only: buys sized by USDC quote, sells sized by base
//! units. Requests carry CB-ACCESS HMAC-SHA256 headers. The quote
//! currency is re-asserted as USDC when the order request is built,
//! independent of the constraint engine.

use crate::config::ExchangeCredentials;
use crate::error::AgentError;
use crate::models::{AccountBalance, Decision, DecisionAction, OrderSide, TradeRecord, TradeStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_API_BASE: &str = "https://api.coinbase.com";
const ACCOUNTS_PATH: &str = "/api/v3/brokerage/accounts";
const ORDERS_PATH: &str = "/api/v3/brokerage/orders";

type HmacSha256 = Hmac<Sha256>;

pub struct CoinbaseClient {
    http: Client,
    base_url: String,
    credentials: ExchangeCredentials,
}

impl CoinbaseClient {
    pub fn new(credentials: ExchangeCredentials, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: DEFAULT_API_BASE.to_string(),
            credentials,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// CB-ACCESS-SIGN: hex HMAC-SHA256 over `timestamp + METHOD + path + body`.
    fn sign(&self, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
        let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);

        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| AgentError::Config(format!("HMAC init failed: {}", e)))?;
        mac.update(message.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_headers(&self, method: &Method, path: &str, body: &str) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, method.as_str(), path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "CB-ACCESS-KEY",
            HeaderValue::from_str(&self.credentials.api_key)
                .map_err(|e| AgentError::Config(format!("invalid API key header: {}", e)))?,
        );
        headers.insert(
            "CB-ACCESS-SIGN",
            HeaderValue::from_str(&signature)
                .map_err(|e| AgentError::Config(format!("invalid signature header: {}", e)))?,
        );
        headers.insert(
            "CB-ACCESS-TIMESTAMP",
            HeaderValue::from_str(&timestamp.to_string())
                .map_err(|e| AgentError::Config(format!("invalid timestamp header: {}", e)))?,
        );

        Ok(headers)
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<T> {
        let body_text = body.unwrap_or_default();
        let headers = self.signed_headers(&method, path, &body_text)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method, &url).headers(headers);
        if !body_text.is_empty() {
            request = request.body(body_text);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::NetworkTimeout(format!("no response from exchange for {}", path))
            } else {
                AgentError::Execution(format!("exchange request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::FatalAuth(format!(
                "exchange returned {}: {}",
                status, detail
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Execution(format!(
                "exchange returned {}: {}",
                status, detail
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Execution(format!("malformed exchange response: {}", e)))
    }

    /// Latest traded price for a product, used to size fills.
    async fn product_price(&self, product_id: &str) -> Result<Decimal> {
        let path = format!("/api/v3/brokerage/products/{}/ticker", product_id);
        let ticker: TickerResponse = self.request(Method::GET, &path, None).await?;

        let raw = ticker
            .trades
            .first()
            .map(|t| t.price.clone())
            .or(ticker.best_ask)
            .ok_or_else(|| {
                AgentError::Execution(format!("ticker response missing price for {}", product_id))
            })?;

        let price: Decimal = raw
            .parse()
            .map_err(|e| AgentError::Execution(format!("invalid ticker price {}: {}", raw, e)))?;
        if price <= Decimal::ZERO {
            return Err(AgentError::Execution(format!(
                "non-positive ticker price for {}",
                product_id
            )));
        }
        Ok(price)
    }
}

#[async_trait]
impl super::ExecutionProvider for CoinbaseClient {
    async fn balances(&self) -> Result<Vec<AccountBalance>> {
        let response: AccountsResponse = self.request(Method::GET, ACCOUNTS_PATH, None).await?;

        let mut balances = Vec::with_capacity(response.accounts.len());
        for account in response.accounts {
            let available: Decimal = match account.available_balance.value.parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(asset = %account.currency, "Skipping unparseable balance");
                    continue;
                }
            };
            balances.push(AccountBalance {
                asset: account.currency,
                available,
            });
        }

        debug!(count = balances.len(), "Fetched account balances");
        Ok(balances)
    }

    async fn execute(&self, decision: &Decision) -> Result<TradeRecord> {
        // Second line of defense: every order this client constructs is
        // quoted in USDC, whatever the decision carried.
        if !decision.quote_currency.eq_ignore_ascii_case("USDC") {
            return Err(AgentError::Execution(format!(
                "refusing order quoted in {}",
                decision.quote_currency
            )));
        }

        let (side, asset, request_amount) = match &decision.action {
            DecisionAction::Buy {
                asset,
                quote_amount,
            } => (OrderSide::Buy, asset, *quote_amount),
            DecisionAction::Sell { asset, base_amount } => (OrderSide::Sell, asset, *base_amount),
            DecisionAction::Hold => {
                return Err(AgentError::Execution(
                    "hold decisions are never executed".to_string(),
                ))
            }
        };

        let product_id = product_id_for(asset);
        let price = self.product_price(&product_id).await?;

        let (quote_amount, base_amount) = match side {
            OrderSide::Buy => (request_amount, request_amount / price),
            OrderSide::Sell => (request_amount * price, request_amount),
        };

        let client_order_id = Uuid::new_v4().to_string();
        let order = CreateOrderRequest {
            client_order_id: client_order_id.clone(),
            product_id: product_id.clone(),
            side: side.to_string(),
            order_configuration: OrderConfiguration {
                market_market_ioc: match side {
                    OrderSide::Buy => MarketIoc {
                        quote_size: Some(quote_amount.round_dp(2).to_string()),
                        base_size: None,
                    },
                    OrderSide::Sell => MarketIoc {
                        quote_size: None,
                        base_size: Some(base_amount.round_dp(8).to_string()),
                    },
                },
            },
        };

        info!(
            product = %product_id,
            side = %side,
            "Placing market IOC order"
        );

        let body = serde_json::to_string(&order)?;
        let response: CreateOrderResponse =
            self.request(Method::POST, ORDERS_PATH, Some(body)).await?;

        let status = if response.success {
            TradeStatus::Filled
        } else {
            warn!(
                product = %product_id,
                reason = response.failure_reason.as_deref().unwrap_or("unknown"),
                "Order rejected by venue"
            );
            TradeStatus::Rejected
        };

        Ok(TradeRecord {
            order_id: response.order_id.unwrap_or(client_order_id),
            asset: asset.to_uppercase(),
            side,
            quote_amount,
            base_amount,
            execution_price: (status == TradeStatus::Filled).then_some(price),
            executed_at: Utc::now(),
            status,
        })
    }
}

/// Normalize an asset symbol into its USDC product id.
fn product_id_for(asset: &str) -> String {
    format!("{}-USDC", asset.trim().to_uppercase())
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    client_order_id: String,
    product_id: String,
    side: String,
    order_configuration: OrderConfiguration,
}

#[derive(Debug, Serialize)]
struct OrderConfiguration {
    market_market_ioc: MarketIoc,
}

#[derive(Debug, Serialize)]
struct MarketIoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    #[serde(default)]
    success: bool,
    order_id: Option<String>,
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    currency: String,
    available_balance: RawBalance,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    trades: Vec<TickerTrade>,
    best_ask: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerTrade {
    price: String,
}
