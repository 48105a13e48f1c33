//! Per-trade state machine: entry confirmation, monitoring loop,
//! direction-aware exit evaluation, and settlement.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::config::{ExecutionConfig, FeeConfig};
use crate::exchange::{ExchangeClient, OrderStatus};
use crate::learning::StrategyStore;
use crate::stats::{PairHistoryStore, PerformanceTracker};
use crate::utils::decimal::pct_change;
use crate::utils::retry::{with_backoff, RetryPolicy};

use super::risk_gate::TradePlan;
use super::{Direction, ExitReason, TradeRecord};

/// One live trade. Owned exclusively by the task monitoring it.
#[derive(Debug)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub position_usd: Decimal,
    pub amount: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub trailing_activation: Decimal,
    pub best_price: Decimal,
    pub trailing_active: bool,
    pub trailing_stop: Decimal,
    trailing_stop_pct: Decimal,
    pub entry_time: Instant,
}

impl Position {
    /// Build a position from a confirmed entry price with direction-aware
    /// TP/SL/trailing levels.
    pub fn open(plan: &TradePlan, entry_price: Decimal, execution: &ExecutionConfig) -> Self {
        let hundred = dec!(100);
        let tp_offset = plan.tp_pct / hundred;
        let sl_offset = plan.sl_pct / hundred;
        let trail_offset = execution.trailing_start_pct / hundred;

        let (tp_price, sl_price, trailing_activation) = match plan.direction {
            Direction::Long => (
                entry_price * (Decimal::ONE + tp_offset),
                entry_price * (Decimal::ONE - sl_offset),
                entry_price * (Decimal::ONE + trail_offset),
            ),
            Direction::Short => (
                entry_price * (Decimal::ONE - tp_offset),
                entry_price * (Decimal::ONE + sl_offset),
                entry_price * (Decimal::ONE - trail_offset),
            ),
        };

        Self {
            symbol: plan.symbol.clone(),
            direction: plan.direction,
            entry_price,
            position_usd: plan.position_usd,
            amount: plan.position_usd / entry_price,
            tp_price,
            sl_price,
            trailing_activation,
            best_price: entry_price,
            trailing_active: false,
            trailing_stop: Decimal::ZERO,
            trailing_stop_pct: execution.trailing_stop_pct,
            entry_time: Instant::now(),
        }
    }

    /// Fold one observed price into the trailing-stop state.
    pub fn observe(&mut self, price: Decimal) {
        let offset = self.trailing_stop_pct / dec!(100);
        match self.direction {
            Direction::Long => {
                if price > self.best_price {
                    self.best_price = price;
                }
                if !self.trailing_active && price >= self.trailing_activation {
                    self.trailing_active = true;
                }
                if self.trailing_active {
                    self.trailing_stop = self.best_price * (Decimal::ONE - offset);
                }
            }
            Direction::Short => {
                if price < self.best_price {
                    self.best_price = price;
                }
                if !self.trailing_active && price <= self.trailing_activation {
                    self.trailing_active = true;
                }
                if self.trailing_active {
                    self.trailing_stop = self.best_price * (Decimal::ONE + offset);
                }
            }
        }
    }

    /// Exit conditions in fixed priority: TP, then SL, then trailing stop.
    pub fn check_exit(&self, price: Decimal) -> Option<ExitReason> {
        match self.direction {
            Direction::Long => {
                if price >= self.tp_price {
                    Some(ExitReason::TakeProfit)
                } else if price <= self.sl_price {
                    Some(ExitReason::StopLoss)
                } else if self.trailing_active && price <= self.trailing_stop {
                    Some(ExitReason::TrailingStop)
                } else {
                    None
                }
            }
            Direction::Short => {
                if price <= self.tp_price {
                    Some(ExitReason::TakeProfit)
                } else if price >= self.sl_price {
                    Some(ExitReason::StopLoss)
                } else if self.trailing_active && price >= self.trailing_stop {
                    Some(ExitReason::TrailingStop)
                } else {
                    None
                }
            }
        }
    }
}

/// Runs one approved trade plan end to end and settles the result into
/// the shared stores. Aborted entries return `Ok(None)` and leave no
/// trace in metrics or history.
pub struct PositionManager<C> {
    client: Arc<C>,
    execution: ExecutionConfig,
    fees: FeeConfig,
    performance: Arc<Mutex<PerformanceTracker>>,
    history: Arc<PairHistoryStore>,
    learning: Arc<StrategyStore>,
}

impl<C: ExchangeClient> PositionManager<C> {
    pub fn new(
        client: Arc<C>,
        execution: ExecutionConfig,
        fees: FeeConfig,
        performance: Arc<Mutex<PerformanceTracker>>,
        history: Arc<PairHistoryStore>,
        learning: Arc<StrategyStore>,
    ) -> Self {
        Self {
            client,
            execution,
            fees,
            performance,
            history,
            learning,
        }
    }

    #[instrument(skip(self, plan), fields(symbol = %plan.symbol, direction = plan.direction.as_str()))]
    pub async fn run(&self, plan: TradePlan) -> Result<Option<TradeRecord>> {
        // ENTERING: a confirmed quote, not the scan-time price, anchors
        // every level. No quote, no order, no trace.
        let entry_quote = match with_backoff(RetryPolicy::default(), "entry_quote", || {
            self.client.get_ticker(&plan.symbol)
        })
        .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Entry quote failed, trade aborted");
                return Ok(None);
            }
        };

        let mut position = Position::open(&plan, entry_quote.last, &self.execution);

        let entry_order = match self
            .client
            .place_market_order(&plan.symbol, plan.direction.entry_side(), position.amount)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "Entry order failed, trade aborted");
                return Ok(None);
            }
        };
        if entry_order.status != OrderStatus::Filled {
            warn!(status = ?entry_order.status, "Entry order not filled, trade aborted");
            return Ok(None);
        }

        info!(
            entry = %position.entry_price,
            size = %position.position_usd,
            tp = %position.tp_price,
            sl = %position.sl_price,
            hold = plan.hold_seconds,
            "Position opened"
        );

        let (exit_reason, exit_price, samples) = self.monitor(&mut position, &plan).await;

        // CLOSED: flatten regardless of how monitoring ended. A failed
        // close is logged, not fatal; the observed price still settles.
        let close = with_backoff(RetryPolicy::default(), "close_order", || {
            self.client
                .place_market_order(&plan.symbol, plan.direction.exit_side(), position.amount)
        })
        .await;
        if let Err(e) = close {
            warn!(error = %e, "Close order failed after retries");
        }

        if samples == 0 {
            // Zero corroborating price observations. A trade with no data
            // behind it must never reach the record.
            warn!(reason = exit_reason.as_str(), "No price observations, trade discarded");
            return Ok(None);
        }

        self.settle(&plan, &position, exit_reason, exit_price)
    }

    /// MONITORING: poll until an exit condition fires. Returns the exit
    /// reason, the price to settle at, and how many quotes were observed.
    async fn monitor(
        &self,
        position: &mut Position,
        plan: &TradePlan,
    ) -> (ExitReason, Decimal, u32) {
        let poll = Duration::from_secs(self.execution.poll_interval_secs);
        let started = Instant::now();
        let mut samples = 0u32;
        let mut consecutive_errors = 0u32;
        let mut last_price = position.entry_price;

        loop {
            tokio::time::sleep(poll).await;

            match self.client.get_ticker(&position.symbol).await {
                Ok(ticker) => {
                    consecutive_errors = 0;
                    samples += 1;
                    last_price = ticker.last;
                    position.observe(ticker.last);
                    if let Some(reason) = position.check_exit(ticker.last) {
                        return (reason, ticker.last, samples);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        consecutive = consecutive_errors,
                        ceiling = self.execution.max_consecutive_errors,
                        error = %e,
                        "Monitoring quote failed"
                    );
                    if consecutive_errors >= self.execution.max_consecutive_errors {
                        return (ExitReason::ErrorExit, last_price, samples);
                    }
                }
            }

            if started.elapsed().as_secs() >= plan.hold_seconds {
                return (ExitReason::Timeout, last_price, samples);
            }
        }
    }

    fn settle(
        &self,
        plan: &TradePlan,
        position: &Position,
        exit_reason: ExitReason,
        exit_price: Decimal,
    ) -> Result<Option<TradeRecord>> {
        let pnl_pct = match position.direction {
            Direction::Long => pct_change(exit_price, position.entry_price),
            Direction::Short => -pct_change(exit_price, position.entry_price),
        };
        let gross_pnl = position.position_usd * pnl_pct / dec!(100);
        let fees = position.position_usd * self.fees.round_trip_rate;
        let net_pnl = gross_pnl - fees;

        let record = TradeRecord {
            pair: plan.symbol.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            position_usd: position.position_usd,
            gross_pnl,
            fees,
            net_pnl,
            exit_reason,
            hold_seconds: position.entry_time.elapsed().as_secs(),
            volatility_pct: plan.volatility_pct,
            spread_pct: plan.spread_pct,
            timestamp: Utc::now(),
        };

        if !self.learning.validate_trade(&record) {
            warn!(pair = %record.pair, "Trade failed validation, dropped");
            return Ok(None);
        }

        info!(
            pair = %record.pair,
            exit = exit_reason.as_str(),
            exit_price = %exit_price,
            gross = %gross_pnl,
            fees = %fees,
            net = %net_pnl,
            win = record.is_win(),
            "Position settled"
        );

        self.performance
            .lock()
            .expect("performance lock poisoned")
            .record(&record);
        self.history
            .record(&record.pair, record.is_win(), record.net_pnl);
        if let Err(e) = self.learning.record_trade(&record) {
            warn!(error = %e, "Failed to persist trade to strategy store");
        }

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HistoryConfig, LearningConfig, SizingConfig};
    use crate::exchange::MockExchange;

    fn plan(direction: Direction) -> TradePlan {
        TradePlan {
            symbol: "BTCUSDT".to_string(),
            direction,
            position_usd: dec!(100),
            tp_pct: dec!(1.5),
            sl_pct: dec!(0.8),
            hold_seconds: 900,
            volatility_pct: dec!(4),
            spread_pct: dec!(0.1),
        }
    }

    fn execution() -> ExecutionConfig {
        ExecutionConfig {
            poll_interval_secs: 0,
            max_consecutive_errors: 3,
            ..Default::default()
        }
    }

    fn fees() -> FeeConfig {
        FeeConfig {
            round_trip_rate: dec!(0.008),
            buffer_pct: dec!(0.2),
        }
    }

    fn manager(mock: Arc<MockExchange>, exec: ExecutionConfig) -> PositionManager<MockExchange> {
        let performance = Arc::new(Mutex::new(PerformanceTracker::new(SizingConfig::default())));
        let history = Arc::new(PairHistoryStore::new(
            HistoryConfig::default(),
            dec!(0.40),
        ));
        let learning =
            Arc::new(StrategyStore::in_memory(LearningConfig::default()).expect("store"));
        PositionManager::new(mock, exec, fees(), performance, history, learning)
    }

    #[test]
    fn test_long_levels_bracket_entry() {
        let p = Position::open(&plan(Direction::Long), dec!(100), &execution());
        assert!(p.sl_price < p.entry_price);
        assert!(p.entry_price < p.tp_price);
        assert_eq!(p.tp_price, dec!(101.500));
        assert_eq!(p.sl_price, dec!(99.200));
        assert_eq!(p.amount, dec!(1));
    }

    #[test]
    fn test_short_levels_bracket_entry() {
        let p = Position::open(&plan(Direction::Short), dec!(100), &execution());
        assert!(p.tp_price < p.entry_price);
        assert!(p.entry_price < p.sl_price);
        assert_eq!(p.tp_price, dec!(98.500));
        assert_eq!(p.sl_price, dec!(100.800));
    }

    #[test]
    fn test_trailing_stop_ratchets_up_for_long() {
        let mut p = Position::open(&plan(Direction::Long), dec!(100), &execution());
        assert!(!p.trailing_active);

        // Activation at entry * 1.008.
        p.observe(dec!(100.8));
        assert!(p.trailing_active);
        assert_eq!(p.trailing_stop, dec!(100.8) * dec!(0.996));

        p.observe(dec!(101.2));
        let raised = p.trailing_stop;
        assert_eq!(raised, dec!(101.2) * dec!(0.996));

        // A pullback never lowers the stop.
        p.observe(dec!(101.0));
        assert_eq!(p.trailing_stop, raised);
        assert_eq!(p.check_exit(dec!(100.7)), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn test_trailing_stop_ratchets_down_for_short() {
        let mut p = Position::open(&plan(Direction::Short), dec!(100), &execution());

        p.observe(dec!(99.2));
        assert!(p.trailing_active);
        assert_eq!(p.trailing_stop, dec!(99.2) * dec!(1.004));

        p.observe(dec!(98.9));
        assert_eq!(p.trailing_stop, dec!(98.9) * dec!(1.004));
        assert_eq!(p.check_exit(dec!(99.4)), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn test_exit_priority_take_profit_first() {
        let mut p = Position::open(&plan(Direction::Long), dec!(100), &execution());
        // Price past both activation and TP: TP wins.
        p.observe(dec!(102));
        assert_eq!(p.check_exit(dec!(102)), Some(ExitReason::TakeProfit));
        assert_eq!(p.check_exit(dec!(99)), Some(ExitReason::StopLoss));
    }

    #[tokio::test]
    async fn test_long_win_settles_exact_pnl() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100)); // entry quote
        mock.push_price("BTCUSDT", dec!(100.5));
        mock.push_price("BTCUSDT", dec!(101.5)); // TP hit

        let m = manager(Arc::clone(&mock), execution());
        let record = m.run(plan(Direction::Long)).await.unwrap().unwrap();

        assert_eq!(record.exit_reason, ExitReason::TakeProfit);
        assert_eq!(record.entry_price, dec!(100));
        assert_eq!(record.exit_price, dec!(101.5));
        assert_eq!(record.gross_pnl, dec!(1.50));
        assert_eq!(record.fees, dec!(0.80));
        assert_eq!(record.net_pnl, dec!(0.70));
        assert!(record.is_win());
        // Entry and close orders both placed.
        assert_eq!(mock.order_count(), 2);
    }

    #[tokio::test]
    async fn test_short_fees_can_eat_a_gross_gain() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100)); // entry quote
        mock.push_price("BTCUSDT", dec!(99.4));

        let mut p = plan(Direction::Short);
        p.hold_seconds = 0; // first tick times out
        let m = manager(Arc::clone(&mock), execution());
        let record = m.run(p).await.unwrap().unwrap();

        assert_eq!(record.exit_reason, ExitReason::Timeout);
        assert_eq!(record.exit_price, dec!(99.4));
        assert_eq!(record.gross_pnl, dec!(0.60));
        assert_eq!(record.fees, dec!(0.80));
        assert_eq!(record.net_pnl, dec!(-0.20));
        assert!(!record.is_win());
    }

    #[tokio::test]
    async fn test_timeout_exits_at_last_fetched_quote() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100)); // entry quote
        mock.push_price("BTCUSDT", dec!(100.3));

        let mut p = plan(Direction::Long);
        p.hold_seconds = 0;
        let m = manager(Arc::clone(&mock), execution());
        let record = m.run(p).await.unwrap().unwrap();

        assert_eq!(record.exit_reason, ExitReason::Timeout);
        assert_eq!(record.exit_price, dec!(100.3));
    }

    #[tokio::test]
    async fn test_entry_quote_failure_places_no_order() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        for _ in 0..3 {
            mock.push_failure("BTCUSDT");
        }

        let m = manager(Arc::clone(&mock), execution());
        let result = m.run(plan(Direction::Long)).await.unwrap();

        assert!(result.is_none());
        assert_eq!(mock.order_count(), 0);
    }

    #[tokio::test]
    async fn test_unfilled_entry_order_aborts() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100));
        mock.reject_orders(true);

        let m = manager(Arc::clone(&mock), execution());
        let result = m.run(plan(Direction::Long)).await.unwrap();

        assert!(result.is_none());
        assert_eq!(mock.order_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_observation_trade_never_recorded() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100)); // entry quote
        for _ in 0..3 {
            mock.push_failure("BTCUSDT"); // every monitoring poll fails
        }

        let exec = execution();
        let performance = Arc::new(Mutex::new(PerformanceTracker::new(SizingConfig::default())));
        let history = Arc::new(PairHistoryStore::new(HistoryConfig::default(), dec!(0.40)));
        let learning =
            Arc::new(StrategyStore::in_memory(LearningConfig::default()).expect("store"));
        let m = PositionManager::new(
            Arc::clone(&mock),
            exec,
            fees(),
            Arc::clone(&performance),
            Arc::clone(&history),
            Arc::clone(&learning),
        );

        let result = m.run(plan(Direction::Long)).await.unwrap();

        assert!(result.is_none());
        assert_eq!(performance.lock().unwrap().total_trades(), 0);
        assert!(history.snapshot().is_empty());
        assert_eq!(learning.recorded_trades(), 0);
    }

    #[tokio::test]
    async fn test_error_ceiling_settles_at_last_good_price() {
        let mock = Arc::new(MockExchange::new(vec!["BTCUSDT".into()], dec!(10000)));
        mock.push_price("BTCUSDT", dec!(100)); // entry quote
        mock.push_price("BTCUSDT", dec!(100.9)); // one good observation
        for _ in 0..3 {
            mock.push_failure("BTCUSDT");
        }

        let m = manager(Arc::clone(&mock), execution());
        let record = m.run(plan(Direction::Long)).await.unwrap().unwrap();

        assert_eq!(record.exit_reason, ExitReason::ErrorExit);
        assert_eq!(record.exit_price, dec!(100.9));
    }
}
