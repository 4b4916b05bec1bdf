//! Constraint engine enforcing the safety envelope
//!
//! Rules-based validation of every proposed decision before execution.
//! Pure and deterministic: no side effects, no I/O. The first failing
//! rule wins and its name is the rejection reason code.

use crate::config::TradingConstraints;
use crate::models::{Decision, DecisionAction};
use crate::state::SessionState;
use rust_decimal::Decimal;

/// Outcome of validating one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected {
        /// Stable reason code, e.g. `forbidden_asset`.
        reason: &'static str,
        details: String,
    },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// A single envelope rule. `check` returns `Some(details)` when the
/// decision violates the rule.
pub trait ConstraintRule: Send + Sync {
    /// Reason code reported when this rule rejects a decision.
    fn name(&self) -> &'static str;

    fn check(&self, decision: &Decision, state: &SessionState) -> Option<String>;
}

/// Ordered rule list; short-circuits on the first violation.
pub struct ConstraintEngine {
    rules: Vec<Box<dyn ConstraintRule>>,
}

impl ConstraintEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ConstraintRule>) {
        self.rules.push(rule);
    }

    /// Validate a decision against the envelope and session state.
    /// Hold decisions pass trivially since no trade is attempted.
    pub fn validate(&self, decision: &Decision, state: &SessionState) -> Verdict {
        if decision.is_hold() {
            return Verdict::Allowed;
        }

        for rule in &self.rules {
            if let Some(details) = rule.check(decision, state) {
                return Verdict::Rejected {
                    reason: rule.name(),
                    details,
                };
            }
        }

        Verdict::Allowed
    }
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Envelope Rules =================
//

/// Rule: the asset must not be on the forbidden list.
struct ForbiddenAssetRule {
    assets: Vec<String>,
}

impl ConstraintRule for ForbiddenAssetRule {
    fn name(&self) -> &'static str {
        "forbidden_asset"
    }

    fn check(&self, decision: &Decision, _state: &SessionState) -> Option<String> {
        let asset = decision.asset()?.to_uppercase();
        if self.assets.iter().any(|f| f == &asset) {
            Some(format!("{} is on the forbidden asset list", asset))
        } else {
            None
        }
    }
}

/// Rule: buys are capped in USDC.
struct BuyCapRule {
    cap: Decimal,
}

impl ConstraintRule for BuyCapRule {
    fn name(&self) -> &'static str {
        "buy_cap_exceeded"
    }

    fn check(&self, decision: &Decision, _state: &SessionState) -> Option<String> {
        match &decision.action {
            DecisionAction::Buy { quote_amount, .. } if *quote_amount > self.cap => Some(format!(
                "buy size {} USDC exceeds the {} USDC cap",
                quote_amount, self.cap
            )),
            _ => None,
        }
    }
}

/// Rule: all orders are denominated in USDC. Decisions arrive in USDC
/// by contract; this catches a model answering in another quote.
struct QuoteCurrencyRule;

impl ConstraintRule for QuoteCurrencyRule {
    fn name(&self) -> &'static str {
        "invalid_quote_currency"
    }

    fn check(&self, decision: &Decision, _state: &SessionState) -> Option<String> {
        if decision.quote_currency.eq_ignore_ascii_case("USDC") {
            None
        } else {
            Some(format!(
                "quote currency {} is not USDC",
                decision.quote_currency
            ))
        }
    }
}

/// Rule: the filled-trade cap.
struct TradeCapRule {
    max_trades: u32,
}

impl ConstraintRule for TradeCapRule {
    fn name(&self) -> &'static str {
        "trade_cap_reached"
    }

    fn check(&self, _decision: &Decision, state: &SessionState) -> Option<String> {
        if state.trade_count >= self.max_trades {
            Some(format!(
                "{} of {} trades already filled",
                state.trade_count, self.max_trades
            ))
        } else {
            None
        }
    }
}

/// Rule: no trade may start past the session deadline.
struct SessionClockRule;

impl ConstraintRule for SessionClockRule {
    fn name(&self) -> &'static str {
        "session_expired"
    }

    fn check(&self, _decision: &Decision, state: &SessionState) -> Option<String> {
        if state.expired() {
            Some(format!("session deadline {} has passed", state.deadline))
        } else {
            None
        }
    }
}

/// Assemble the envelope rules in their enforcement order.
pub fn default_constraint_engine(constraints: &TradingConstraints) -> ConstraintEngine {
    let mut engine = ConstraintEngine::new();
    engine.add_rule(Box::new(ForbiddenAssetRule {
        assets: constraints.forbidden_assets.clone(),
    }));
    engine.add_rule(Box::new(BuyCapRule {
        cap: constraints.max_buy_usdc,
    }));
    engine.add_rule(Box::new(QuoteCurrencyRule));
    engine.add_rule(Box::new(TradeCapRule {
        max_trades: constraints.max_trades,
    }));
    engine.add_rule(Box::new(SessionClockRule));
    engine
}

//
// ================= Tests =================
//
