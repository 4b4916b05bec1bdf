//! Execution provider trait and implementations
//!
//! The execution side of the loop: balances in, orders out. Called by
//! the orchestrator only for decisions the constraint engine allowed.

use crate::error::AgentError;
use crate::models::{AccountBalance, Decision, DecisionAction, OrderSide, TradeRecord, TradeStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

pub mod coinbase;
pub use coinbase::CoinbaseClient;

#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Current available balances per asset.
    async fn balances(&self) -> Result<Vec<AccountBalance>>;

    /// Place the order for an approved, non-hold decision and report
    /// what the venue did with it.
    async fn execute(&self, decision: &Decision) -> Result<TradeRecord>;
}

//
// ================= Mock Exchange =================
//

/// Scripted outcome for one `execute` call on the mock exchange.
pub enum MockOutcome {
    Fill,
    Reject,
    VenueError,
    Timeout,
    AuthError,
}

/// Deterministic exchange for development & testing. Fills every order
/// at a fixed price unless an outcome script says otherwise.
pub struct MockExchange {
    balances: Vec<AccountBalance>,
    fill_price: Decimal,
    outcomes: Mutex<VecDeque<MockOutcome>>,
}

impl MockExchange {
    pub fn new(balances: Vec<AccountBalance>, fill_price: Decimal) -> Self {
        Self {
            balances,
            fill_price,
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue outcomes for upcoming `execute` calls; once drained, every
    /// order fills.
    pub fn with_outcomes(self, outcomes: Vec<MockOutcome>) -> Self {
        *self.outcomes.lock().expect("mock outcomes lock poisoned") = outcomes.into();
        self
    }

    fn record(&self, decision: &Decision, status: TradeStatus) -> TradeRecord {
        let (side, asset, quote_amount, base_amount) = match &decision.action {
            DecisionAction::Buy {
                asset,
                quote_amount,
            } => (
                OrderSide::Buy,
                asset.clone(),
                *quote_amount,
                *quote_amount / self.fill_price,
            ),
            DecisionAction::Sell { asset, base_amount } => (
                OrderSide::Sell,
                asset.clone(),
                *base_amount * self.fill_price,
                *base_amount,
            ),
            DecisionAction::Hold => unreachable!("hold decisions are never executed"),
        };

        TradeRecord {
            order_id: Uuid::new_v4().to_string(),
            asset,
            side,
            quote_amount,
            base_amount,
            execution_price: (status == TradeStatus::Filled).then_some(self.fill_price),
            executed_at: Utc::now(),
            status,
        }
    }
}

#[async_trait]
impl ExecutionProvider for MockExchange {
    async fn balances(&self) -> Result<Vec<AccountBalance>> {
        Ok(self.balances.clone())
    }

    async fn execute(&self, decision: &Decision) -> Result<TradeRecord> {
        let outcome = self
            .outcomes
            .lock()
            .expect("mock outcomes lock poisoned")
            .pop_front()
            .unwrap_or(MockOutcome::Fill);

        match outcome {
            MockOutcome::Fill => Ok(self.record(decision, TradeStatus::Filled)),
            MockOutcome::Reject => Ok(self.record(decision, TradeStatus::Rejected)),
            MockOutcome::VenueError => Err(AgentError::Execution(
                "venue rejected the request".to_string(),
            )),
            MockOutcome::Timeout => Err(AgentError::NetworkTimeout(
                "exchange did not respond".to_string(),
            )),
            MockOutcome::AuthError => {
                Err(AgentError::FatalAuth("credentials rejected".to_string()))
            }
        }
    }
}
