//! Main orchestrator - drives the decision cycle
//!
//! FETCH_CONTEXT → QUERY_DECISION → VALIDATE → EXECUTE → RECORD → CHECK_TERMINATION → SLEEP
//!
//! The orchestrator is the sole owner of the session state and the sole
//! writer of the journal. One cycle at a time, one outstanding external
//! request at a time.

use crate::config::AgentConfig;
use crate::constraints::{default_constraint_engine, ConstraintEngine, Verdict};
use crate::decision::DecisionProvider;
use crate::error::AgentError;
use crate::exchange::ExecutionProvider;
use crate::journal::Journal;
use crate::models::{
    Decision, EntryKind, MarketSnapshot, SessionReport, TerminationReason, TradeStatus,
};
use crate::state::SessionState;
use crate::Result;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drives one trading session from INIT to TERMINATED.
pub struct Orchestrator {
    config: AgentConfig,
    engine: ConstraintEngine,
    decision_provider: Box<dyn DecisionProvider>,
    execution_provider: Box<dyn ExecutionProvider>,
    journal: Journal,
    state: SessionState,
    stop: watch::Receiver<bool>,
}

impl Orchestrator {
    /// INIT: build the session state and journal, record the session
    /// metadata, and arm the constraint engine. Fails before any cycle
    /// runs if the configuration is unusable.
    pub fn new(
        config: AgentConfig,
        decision_provider: Box<dyn DecisionProvider>,
        execution_provider: Box<dyn ExecutionProvider>,
        stop: watch::Receiver<bool>,
    ) -> Result<Self> {
        config.validate()?;

        let state = SessionState::new(&config.constraints);
        let mut journal = Journal::create(&config.journal, &state, &config.constraints)?;

        let metadata = json!({
            "session_id": state.session_id,
            "start_time": state.started_at.to_rfc3339(),
            "deadline": state.deadline.to_rfc3339(),
            "max_runtime_hours": config.constraints.max_runtime.num_hours(),
            "profit_target_usdc": config.constraints.profit_target_usdc,
            "max_trades": config.constraints.max_trades,
            "max_buy_usdc": config.constraints.max_buy_usdc,
            "forbidden_assets": config.constraints.forbidden_assets,
        });
        journal.append(
            EntryKind::System,
            format!("Session started\n{}", serde_json::to_string_pretty(&metadata)?),
        )?;

        let engine = default_constraint_engine(&config.constraints);

        Ok(Self {
            config,
            engine,
            decision_provider,
            execution_provider,
            journal,
            state,
            stop,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// RUNNING: repeat the decision cycle until a termination condition
    /// fires. Returns the session report on clean termination; an auth
    /// failure terminates the session and propagates as a fatal error.
    pub async fn run(&mut self) -> Result<SessionReport> {
        info!(
            session_id = %self.state.session_id,
            deadline = %self.state.deadline,
            "Session running"
        );

        loop {
            // Manual stop, checked at the cycle boundary so an in-flight
            // execution call always completes first.
            if *self.stop.borrow() {
                return self.finish(TerminationReason::Manual);
            }

            // === FETCH_CONTEXT ===
            let context = self.journal.render_context();

            let balances = match self.execution_provider.balances().await {
                Ok(balances) => Some(balances),
                Err(AgentError::FatalAuth(msg)) => return self.fail_auth(msg),
                Err(e) => {
                    warn!(error = %e, "Balance fetch failed, skipping cycle");
                    self.journal.append(
                        EntryKind::System,
                        format!("Balance fetch failed: {}. Cycle skipped.", e),
                    )?;
                    None
                }
            };

            if let Some(balances) = balances {
                let snapshot = MarketSnapshot::from_balances(
                    &balances,
                    &self.config.constraints.forbidden_assets,
                );

                // === QUERY_DECISION ===
                let decision = match self.decision_provider.decide(&context, &snapshot).await {
                    Ok(decision) => Some(decision),
                    Err(AgentError::DecisionParse(msg)) => {
                        // Recoverable: a confused model holds.
                        warn!(error = %msg, "Unparseable model reply, holding");
                        self.journal.append(
                            EntryKind::System,
                            format!("Model reply could not be parsed: {}. Treating as HOLD.", msg),
                        )?;
                        Some(Decision::hold("Decision substituted after parse failure."))
                    }
                    Err(AgentError::FatalAuth(msg)) => return self.fail_auth(msg),
                    Err(e) => {
                        warn!(error = %e, "Decision query failed, skipping cycle");
                        self.journal.append(
                            EntryKind::System,
                            format!("Decision query failed: {}. Cycle skipped.", e),
                        )?;
                        None
                    }
                };

                if let Some(decision) = decision {
                    match self.resolve_decision(decision).await {
                        Ok(()) => {}
                        Err(AgentError::FatalAuth(msg)) => return self.fail_auth(msg),
                        Err(e) => return Err(e),
                    }
                }
            }

            // === CHECK_TERMINATION ===
            // Evaluated against the post-cycle snapshot, never mid-cycle.
            if let Some(reason) = self.state.check_termination(&self.config.constraints) {
                return self.finish(reason);
            }

            debug!(
                trade_count = self.state.trade_count,
                realized_profit = %self.state.realized_profit,
                "Cycle complete, sleeping"
            );

            let mut stop = self.stop.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = stop.changed() => {}
            }
        }
    }

    /// VALIDATE → EXECUTE → RECORD for one decision.
    async fn resolve_decision(&mut self, decision: Decision) -> Result<()> {
        match self.engine.validate(&decision, &self.state) {
            Verdict::Rejected { reason, details } => {
                info!(reason, decision = %decision.summary(), "Decision rejected");
                self.journal.append(
                    EntryKind::Rejection,
                    format!(
                        "Rejected {}: {} ({})\nRationale: {}",
                        decision.summary(),
                        reason,
                        details,
                        decision.rationale
                    ),
                )?;
            }
            Verdict::Allowed if !decision.is_hold() => {
                // === EXECUTE ===
                match self.execution_provider.execute(&decision).await {
                    Ok(trade) => {
                        info!(
                            order_id = %trade.order_id,
                            status = %trade.status,
                            "Order resolved"
                        );
                        self.journal.append(
                            EntryKind::Trade,
                            format!(
                                "{} {} | order {} | price {} | net cash flow {} USDC\nRationale: {}",
                                trade.status,
                                decision.summary(),
                                trade.order_id,
                                trade
                                    .execution_price
                                    .map(|p| p.to_string())
                                    .unwrap_or_else(|| "n/a".to_string()),
                                if trade.status == TradeStatus::Filled {
                                    trade.net_cash_flow().to_string()
                                } else {
                                    "0".to_string()
                                },
                                decision.rationale
                            ),
                        )?;
                        // Only filled trades consume the cap or move profit.
                        if trade.status == TradeStatus::Filled {
                            self.state.apply_fill(&trade);
                        }
                    }
                    Err(AgentError::FatalAuth(msg)) => {
                        // Surface through run() on the next statement.
                        return Err(AgentError::FatalAuth(msg));
                    }
                    Err(AgentError::NetworkTimeout(msg)) => {
                        warn!(error = %msg, "Execution timed out");
                        self.journal.append(
                            EntryKind::System,
                            format!("Execution timed out: {}. No order confirmed.", msg),
                        )?;
                    }
                    Err(e) => {
                        warn!(error = %e, "Execution failed");
                        self.journal.append(
                            EntryKind::Trade,
                            format!(
                                "FAILED {} | {}\nRationale: {}",
                                decision.summary(),
                                e,
                                decision.rationale
                            ),
                        )?;
                    }
                }
            }
            Verdict::Allowed => {
                self.journal.append(
                    EntryKind::Decision,
                    format!("HOLD\nRationale: {}", decision.rationale),
                )?;
            }
        }
        Ok(())
    }

    /// TERMINATED: record the final system entry and build the report.
    fn finish(&mut self, reason: TerminationReason) -> Result<SessionReport> {
        self.state.terminate(reason);
        self.journal.append(
            EntryKind::System,
            format!(
                "Session terminated: {} | realized profit: {} USDC | filled trades: {}",
                reason, self.state.realized_profit, self.state.trade_count
            ),
        )?;

        info!(
            session_id = %self.state.session_id,
            reason = %reason,
            realized_profit = %self.state.realized_profit,
            trade_count = self.state.trade_count,
            "Session terminated"
        );

        Ok(SessionReport {
            session_id: self.state.session_id,
            termination_reason: reason,
            trade_count: self.state.trade_count,
            realized_profit: self.state.realized_profit,
            journal_entries: self.journal.len(),
        })
    }

    /// Invalid credentials end the session immediately; the error is
    /// propagated so the process exits non-zero.
    fn fail_auth(&mut self, msg: String) -> Result<SessionReport> {
        warn!(error = %msg, "Fatal auth error, terminating session");
        self.finish(TerminationReason::AuthFailure)?;
        Err(AgentError::FatalAuth(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JournalConfig, TradingConstraints};
    use crate::decision::MockDecisionProvider;
    use crate::exchange::{MockExchange, MockOutcome};
    use crate::models::{AccountBalance, DecisionAction};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_config(constraints: TradingConstraints) -> AgentConfig {
        AgentConfig {
            constraints,
            journal: JournalConfig {
                directory: std::env::temp_dir().join(format!("agent-test-{}", Uuid::new_v4())),
                ..JournalConfig::default()
            },
            poll_interval: Duration::from_millis(1),
            ..AgentConfig::default()
        }
    }

    fn buy(asset: &str, quote_amount: Decimal) -> Decision {
        Decision {
            action: DecisionAction::Buy {
                asset: asset.to_string(),
                quote_amount,
            },
            quote_currency: "USDC".to_string(),
            rationale: "test buy".to_string(),
            decided_at: Utc::now(),
        }
    }

    fn sell(asset: &str, base_amount: Decimal) -> Decision {
        Decision {
            action: DecisionAction::Sell {
                asset: asset.to_string(),
                base_amount,
            },
            quote_currency: "USDC".to_string(),
            rationale: "test sell".to_string(),
            decided_at: Utc::now(),
        }
    }

    fn funding() -> Vec<AccountBalance> {
        vec![AccountBalance {
            asset: "USDC".to_string(),
            available: dec!(500),
        }]
    }

    fn orchestrator(
        constraints: TradingConstraints,
        decisions: Vec<crate::Result<Decision>>,
        exchange: MockExchange,
    ) -> Orchestrator {
        let (_tx, rx) = watch::channel(false);
        Orchestrator::new(
            test_config(constraints),
            Box::new(MockDecisionProvider::new(decisions)),
            Box::new(exchange),
            rx,
        )
        .unwrap()
    }

    /// Constraints whose deadline has already passed end the session at
    /// the first termination check, bounding test loops to one cycle.
    fn expiring_constraints() -> TradingConstraints {
        TradingConstraints {
            max_runtime: chrono::Duration::zero(),
            ..TradingConstraints::default()
        }
    }

    #[tokio::test]
    async fn profit_target_terminates_the_session() {
        let mut orchestrator = orchestrator(
            TradingConstraints::default(),
            vec![Ok(buy("DOGE", dec!(100))), Ok(sell("DOGE", dec!(152)))],
            MockExchange::new(funding(), dec!(1)),
        );

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.termination_reason, TerminationReason::ProfitTarget);
        assert_eq!(report.trade_count, 2);
        assert_eq!(report.realized_profit, dec!(52));
    }

    #[tokio::test]
    async fn forbidden_asset_is_journaled_and_never_executed() {
        let mut orchestrator = orchestrator(
            expiring_constraints(),
            vec![Ok(buy("SOL", dec!(50)))],
            MockExchange::new(funding(), dec!(1)),
        );

        let report = orchestrator.run().await.unwrap();

        // No trade happened; the session ended on its (zero) clock.
        assert_eq!(report.termination_reason, TerminationReason::Timeout);
        assert_eq!(report.trade_count, 0);

        let context = orchestrator.journal().render_context();
        assert!(context.contains("## REJECTION"));
        assert!(context.contains("forbidden_asset"));
        assert!(!context.contains("## TRADE"));
    }

    #[tokio::test]
    async fn parse_failure_becomes_a_hold_with_system_entry() {
        let mut orchestrator = orchestrator(
            expiring_constraints(),
            vec![Err(AgentError::DecisionParse("gibberish reply".to_string()))],
            MockExchange::new(funding(), dec!(1)),
        );

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.trade_count, 0);

        let context = orchestrator.journal().render_context();
        assert!(context.contains("could not be parsed"));
        assert!(context.contains("HOLD"));
    }

    #[tokio::test]
    async fn trade_cap_terminates_before_a_further_trade() {
        let constraints = TradingConstraints {
            max_trades: 2,
            ..TradingConstraints::default()
        };
        let mut orchestrator = orchestrator(
            constraints,
            vec![
                Ok(buy("DOGE", dec!(10))),
                Ok(buy("DOGE", dec!(10))),
                // Never reached: the cap fires at the post-cycle check.
                Ok(buy("DOGE", dec!(10))),
            ],
            MockExchange::new(funding(), dec!(1)),
        );

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.termination_reason, TerminationReason::TradeCap);
        assert_eq!(report.trade_count, 2);
        assert_eq!(report.realized_profit, dec!(-20));
    }

    #[tokio::test]
    async fn non_filled_results_never_count_against_the_cap() {
        let mut orchestrator = orchestrator(
            TradingConstraints::default(),
            vec![
                Ok(buy("DOGE", dec!(10))),
                Ok(buy("DOGE", dec!(10))),
                Ok(sell("DOGE", dec!(60))),
            ],
            MockExchange::new(funding(), dec!(1))
                .with_outcomes(vec![MockOutcome::Reject, MockOutcome::VenueError]),
        );

        let report = orchestrator.run().await.unwrap();

        // Only the final sell filled: +60 USDC ends the session.
        assert_eq!(report.termination_reason, TerminationReason::ProfitTarget);
        assert_eq!(report.trade_count, 1);
        assert_eq!(report.realized_profit, dec!(60));

        let context = orchestrator.journal().render_context();
        assert!(context.contains("REJECTED BUY DOGE"));
        assert!(context.contains("FAILED BUY DOGE"));
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_and_journaled() {
        let mut orchestrator = orchestrator(
            TradingConstraints::default(),
            vec![Ok(buy("DOGE", dec!(10)))],
            MockExchange::new(funding(), dec!(1)).with_outcomes(vec![MockOutcome::AuthError]),
        );

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, AgentError::FatalAuth(_)));

        assert_eq!(
            orchestrator.state().termination_reason,
            Some(TerminationReason::AuthFailure)
        );
        let context = orchestrator.journal().render_context();
        assert!(context.contains("auth_failure"));
    }

    #[tokio::test]
    async fn manual_stop_terminates_before_any_cycle() {
        let (tx, rx) = watch::channel(true);
        let mut orchestrator = Orchestrator::new(
            test_config(TradingConstraints::default()),
            Box::new(MockDecisionProvider::new(vec![])),
            Box::new(MockExchange::new(funding(), dec!(1))),
            rx,
        )
        .unwrap();
        drop(tx);

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.termination_reason, TerminationReason::Manual);
        assert_eq!(report.trade_count, 0);
        // Session-start and termination system entries only.
        assert_eq!(report.journal_entries, 2);
    }
}
