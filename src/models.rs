//! Core data models for the trading agent

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Filled,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Terminated,
}

/// Why a session left the RUNNING state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TradeCap,
    ProfitTarget,
    Timeout,
    Manual,
    AuthFailure,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::TradeCap => "trade_cap",
            TerminationReason::ProfitTarget => "profit_target",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Manual => "manual",
            TerminationReason::AuthFailure => "auth_failure",
        }
    }
}

//
// ================= Decision =================
//

/// The action the model proposed for one cycle.
///
/// Buys are sized in USDC (quote), sells in units of the base asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DecisionAction {
    Buy { asset: String, quote_amount: Decimal },
    Sell { asset: String, base_amount: Decimal },
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: DecisionAction,
    /// Quote currency the model expressed the trade in. The parser
    /// defaults this to USDC; anything else is caught by the
    /// constraint engine.
    pub quote_currency: String,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn hold(rationale: impl Into<String>) -> Self {
        Self {
            action: DecisionAction::Hold,
            quote_currency: "USDC".to_string(),
            rationale: rationale.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self.action, DecisionAction::Hold)
    }

    pub fn asset(&self) -> Option<&str> {
        match &self.action {
            DecisionAction::Buy { asset, .. } | DecisionAction::Sell { asset, .. } => {
                Some(asset.as_str())
            }
            DecisionAction::Hold => None,
        }
    }

    pub fn side(&self) -> Option<OrderSide> {
        match self.action {
            DecisionAction::Buy { .. } => Some(OrderSide::Buy),
            DecisionAction::Sell { .. } => Some(OrderSide::Sell),
            DecisionAction::Hold => None,
        }
    }

    /// One-line summary used in journal entries.
    pub fn summary(&self) -> String {
        match &self.action {
            DecisionAction::Buy {
                asset,
                quote_amount,
            } => format!("BUY {} for {} USDC", asset, quote_amount),
            DecisionAction::Sell { asset, base_amount } => {
                format!("SELL {} {}", base_amount, asset)
            }
            DecisionAction::Hold => "HOLD".to_string(),
        }
    }
}

//
// ================= Trade Record =================
//

/// Result of handing an approved decision to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_id: String,
    pub asset: String,
    pub side: OrderSide,
    /// USDC notional: spend for buys, proceeds for sells.
    pub quote_amount: Decimal,
    pub base_amount: Decimal,
    pub execution_price: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
    pub status: TradeStatus,
}

impl TradeRecord {
    /// Net USDC cash flow of a filled trade: sells add, buys subtract.
    pub fn net_cash_flow(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => -self.quote_amount,
            OrderSide::Sell => self.quote_amount,
        }
    }
}

//
// ================= Journal =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Decision,
    Rejection,
    Trade,
    System,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Decision => "DECISION",
            EntryKind::Rejection => "REJECTION",
            EntryKind::Trade => "TRADE",
            EntryKind::System => "SYSTEM",
        }
    }
}

/// One appended journal record. Sequence numbers are assigned by the
/// journal, strictly increasing and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub kind: EntryKind,
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub available: Decimal,
}

/// Market context forwarded to the model each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub usdc_balance: Decimal,
    pub open_positions: BTreeMap<String, Decimal>,
    pub candidate_products: Vec<String>,
}

impl MarketSnapshot {
    /// Derive the snapshot from live balances: USDC funding, current
    /// non-forbidden holdings, and the tradable `<ASSET>-USDC` pairs.
    pub fn from_balances(balances: &[AccountBalance], forbidden_assets: &[String]) -> Self {
        let mut usdc_balance = Decimal::ZERO;
        let mut open_positions = BTreeMap::new();

        for balance in balances {
            let asset = balance.asset.to_uppercase();
            if asset == "USDC" {
                usdc_balance = balance.available;
                continue;
            }
            if forbidden_assets.iter().any(|f| f == &asset) {
                continue;
            }
            open_positions.insert(asset, balance.available);
        }

        let candidate_products = open_positions
            .keys()
            .map(|asset| format!("{}-USDC", asset))
            .collect();

        Self {
            usdc_balance,
            open_positions,
            candidate_products,
        }
    }
}

//
// ================= Session Report =================
//

/// Final summary returned by the orchestrator once the session is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub termination_reason: TerminationReason,
    pub trade_count: u32,
    pub realized_profit: Decimal,
    pub journal_entries: u64,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeStatus::Filled => "FILLED",
            TradeStatus::Rejected => "REJECTED",
            TradeStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balances() -> Vec<AccountBalance> {
        vec![
            AccountBalance {
                asset: "usdc".to_string(),
                available: dec!(431.20),
            },
            AccountBalance {
                asset: "DOGE".to_string(),
                available: dec!(1500),
            },
            AccountBalance {
                asset: "BTC".to_string(),
                available: dec!(0.002),
            },
        ]
    }

    #[test]
    fn snapshot_excludes_usdc_and_forbidden_assets() {
        let forbidden = vec!["SOL".to_string(), "BTC".to_string()];
        let snapshot = MarketSnapshot::from_balances(&balances(), &forbidden);

        assert_eq!(snapshot.usdc_balance, dec!(431.20));
        assert_eq!(snapshot.open_positions.len(), 1);
        assert_eq!(snapshot.open_positions["DOGE"], dec!(1500));
        assert_eq!(snapshot.candidate_products, vec!["DOGE-USDC".to_string()]);
    }

    #[test]
    fn net_cash_flow_signs() {
        let buy = TradeRecord {
            order_id: "o1".to_string(),
            asset: "DOGE".to_string(),
            side: OrderSide::Buy,
            quote_amount: dec!(50),
            base_amount: dec!(400),
            execution_price: Some(dec!(0.125)),
            executed_at: Utc::now(),
            status: TradeStatus::Filled,
        };
        assert_eq!(buy.net_cash_flow(), dec!(-50));

        let sell = TradeRecord {
            side: OrderSide::Sell,
            ..buy
        };
        assert_eq!(sell.net_cash_flow(), dec!(50));
    }

    #[test]
    fn decision_summary_shapes() {
        let buy = Decision {
            action: DecisionAction::Buy {
                asset: "DOGE".to_string(),
                quote_amount: dec!(25),
            },
            quote_currency: "USDC".to_string(),
            rationale: "momentum".to_string(),
            decided_at: Utc::now(),
        };
        assert_eq!(buy.summary(), "BUY DOGE for 25 USDC");
        assert_eq!(buy.asset(), Some("DOGE"));
        assert_eq!(buy.side(), Some(OrderSide::Buy));

        let hold = Decision::hold("nothing attractive");
        assert!(hold.is_hold());
        assert_eq!(hold.summary(), "HOLD");
        assert_eq!(hold.asset(), None);
    }
}
