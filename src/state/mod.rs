//! Session state
//!
//! Counters and clock for one trading session. Owned exclusively by the
//! orchestrator; mutated only after a cycle's effects are known.

use crate::config::TradingConstraints;
use crate::models::{SessionStatus, TerminationReason, TradeRecord, TradeStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub trade_count: u32,
    /// Cumulative net USDC cash flow: sell proceeds minus buy spend.
    pub realized_profit: Decimal,
    pub status: SessionStatus,
    pub termination_reason: Option<TerminationReason>,
}

impl SessionState {
    pub fn new(constraints: &TradingConstraints) -> Self {
        let started_at = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            started_at,
            deadline: started_at + constraints.max_runtime,
            trade_count: 0,
            realized_profit: Decimal::ZERO,
            status: SessionStatus::Running,
            termination_reason: None,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    pub fn expired(&self) -> bool {
        Utc::now() >= self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Apply a filled trade: bump the count and fold its cash flow into
    /// realized profit. Non-filled records never reach this method.
    pub fn apply_fill(&mut self, trade: &TradeRecord) {
        debug_assert_eq!(trade.status, TradeStatus::Filled);
        self.trade_count += 1;
        self.realized_profit += trade.net_cash_flow();
    }

    /// Evaluate the automatic termination conditions against the current
    /// snapshot. First matching condition wins: trade cap, then profit
    /// target, then timeout.
    pub fn check_termination(&self, constraints: &TradingConstraints) -> Option<TerminationReason> {
        if self.trade_count >= constraints.max_trades {
            return Some(TerminationReason::TradeCap);
        }
        if self.realized_profit >= constraints.profit_target_usdc {
            return Some(TerminationReason::ProfitTarget);
        }
        if self.expired() {
            return Some(TerminationReason::Timeout);
        }
        None
    }

    pub fn terminate(&mut self, reason: TerminationReason) {
        self.status = SessionStatus::Terminated;
        self.termination_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use rust_decimal_macros::dec;

    fn filled(side: OrderSide, quote_amount: Decimal) -> TradeRecord {
        TradeRecord {
            order_id: "o1".to_string(),
            asset: "DOGE".to_string(),
            side,
            quote_amount,
            base_amount: dec!(1),
            execution_price: None,
            executed_at: Utc::now(),
            status: TradeStatus::Filled,
        }
    }

    #[test]
    fn fills_accumulate_net_cash_flow() {
        let constraints = TradingConstraints::default();
        let mut state = SessionState::new(&constraints);

        state.apply_fill(&filled(OrderSide::Buy, dec!(100)));
        state.apply_fill(&filled(OrderSide::Sell, dec!(148)));

        assert_eq!(state.trade_count, 2);
        assert_eq!(state.realized_profit, dec!(48));
        assert!(state.check_termination(&constraints).is_none());
    }

    #[test]
    fn profit_target_fires_at_exactly_fifty() {
        let constraints = TradingConstraints::default();
        let mut state = SessionState::new(&constraints);

        state.apply_fill(&filled(OrderSide::Sell, dec!(48)));
        assert!(state.check_termination(&constraints).is_none());

        state.apply_fill(&filled(OrderSide::Sell, dec!(5)));
        assert_eq!(state.realized_profit, dec!(53));
        assert_eq!(
            state.check_termination(&constraints),
            Some(TerminationReason::ProfitTarget)
        );
    }

    #[test]
    fn trade_cap_takes_priority_over_profit_target() {
        let constraints = TradingConstraints::default();
        let mut state = SessionState::new(&constraints);
        state.trade_count = 15;
        state.realized_profit = dec!(75);

        assert_eq!(
            state.check_termination(&constraints),
            Some(TerminationReason::TradeCap)
        );
    }

    #[test]
    fn timeout_fires_once_deadline_passes() {
        let constraints = TradingConstraints::default();
        let mut state = SessionState::new(&constraints);
        state.started_at = Utc::now() - chrono::Duration::hours(6);
        state.deadline = state.started_at + constraints.max_runtime;

        assert!(state.expired());
        assert_eq!(
            state.check_termination(&constraints),
            Some(TerminationReason::Timeout)
        );
    }

    #[test]
    fn terminate_is_terminal() {
        let constraints = TradingConstraints::default();
        let mut state = SessionState::new(&constraints);
        state.terminate(TerminationReason::Manual);

        assert!(!state.is_running());
        assert_eq!(state.termination_reason, Some(TerminationReason::Manual));
    }
}
