//! The trading engine: scan, rank, gate, execute, settle, repeat.

mod position;
mod regime;
mod risk_gate;
mod scanner;
mod signal;

pub use position::{Position, PositionManager};
pub use regime::Regime;
pub use risk_gate::{RiskGate, TradePlan};
pub use scanner::{PairScanner, RejectReason, ScanResult};
pub use signal::SignalScorer;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::exchange::{ExchangeClient, OrderSide};
use crate::learning::StrategyStore;
use crate::stats::{PairHistoryStore, PerformanceTracker};

/// Trade direction. Shorts mirror every price comparison longs make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    pub fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a position left the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Timeout,
    ErrorExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Timeout => "timeout",
            ExitReason::ErrorExit => "error_exit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "take_profit" => Some(ExitReason::TakeProfit),
            "stop_loss" => Some(ExitReason::StopLoss),
            "trailing_stop" => Some(ExitReason::TrailingStop),
            "timeout" => Some(ExitReason::Timeout),
            "error_exit" => Some(ExitReason::ErrorExit),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable settlement artifact, created once per completed trade.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub pair: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub position_usd: Decimal,
    pub gross_pnl: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub exit_reason: ExitReason,
    pub hold_seconds: u64,
    pub volatility_pct: Decimal,
    pub spread_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}

/// Suggested trade parameters mined from past trades for one pair.
/// Consumed read-only; `validated` marks patterns with enough sample
/// behind them to trust.
#[derive(Debug, Clone)]
pub struct StrategyOverride {
    pub pair: String,
    pub leverage: Option<u32>,
    pub tp_pct: Option<Decimal>,
    pub sl_pct: Option<Decimal>,
    pub hold_seconds: Option<u64>,
    pub position_usd: Option<Decimal>,
    pub validated: bool,
    pub estimated_edge_pct: Decimal,
}

/// What one cycle did, for the operator log.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub scanned: usize,
    pub candidates: usize,
    pub rejected: u32,
    pub launched: usize,
    pub settled: usize,
}

/// Rank candidates by signal strength, strongest first; scan order breaks
/// ties. Returns at most `limit` results.
fn rank_candidates(mut candidates: Vec<(usize, ScanResult)>, limit: usize) -> Vec<ScanResult> {
    candidates.sort_by_key(|(idx, _)| *idx);
    candidates.sort_by(|a, b| b.1.signal_strength.cmp(&a.1.signal_strength));
    candidates
        .into_iter()
        .take(limit)
        .map(|(_, scan)| scan)
        .collect()
}

/// Owns the scan/dispatch loop. One instance per process.
pub struct Engine<C: ExchangeClient + 'static> {
    client: Arc<C>,
    config: Config,
    scanner: PairScanner,
    risk_gate: RiskGate,
    performance: Arc<Mutex<PerformanceTracker>>,
    history: Arc<PairHistoryStore>,
    learning: Arc<StrategyStore>,
    manager: Arc<PositionManager<C>>,
    shutdown: Arc<AtomicBool>,
}

impl<C: ExchangeClient + 'static> Engine<C> {
    pub fn new(
        client: Arc<C>,
        config: Config,
        learning: Arc<StrategyStore>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let scanner = PairScanner::new(
            config.scanner.clone(),
            config.signal.clone(),
            &config.execution,
        );
        let risk_gate = RiskGate::new(
            config.execution.clone(),
            config.fees.clone(),
            config.sizing.clone(),
        );
        let performance = Arc::new(Mutex::new(PerformanceTracker::new(config.sizing.clone())));
        let history = Arc::new(PairHistoryStore::new(
            config.history.clone(),
            config.scanner.min_pair_winrate,
        ));
        let manager = Arc::new(PositionManager::new(
            Arc::clone(&client),
            config.execution.clone(),
            config.fees.clone(),
            Arc::clone(&performance),
            Arc::clone(&history),
            Arc::clone(&learning),
        ));

        Self {
            client,
            config,
            scanner,
            risk_gate,
            performance,
            history,
            learning,
            manager,
            shutdown,
        }
    }

    /// Main loop. A failed cycle is logged and followed by a cooldown;
    /// only the shutdown flag ends the loop. In-flight positions always
    /// run to their natural exit because each cycle joins its tasks
    /// before this loop regains control.
    pub async fn run(&self) -> Result<()> {
        info!(
            pairs_quote = %self.config.exchange.quote_asset,
            max_concurrent = self.config.execution.max_concurrent_trades,
            cycle_secs = self.config.execution.cycle_seconds,
            "Engine started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            match self.run_cycle().await {
                Ok(summary) => {
                    info!(
                        scanned = summary.scanned,
                        candidates = summary.candidates,
                        rejected = summary.rejected,
                        launched = summary.launched,
                        settled = summary.settled,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Cycle complete"
                    );
                    let remaining = self
                        .config
                        .execution
                        .cycle_seconds
                        .saturating_sub(started.elapsed().as_secs())
                        .max(self.config.execution.min_cycle_sleep_secs);
                    self.idle(remaining).await;
                }
                Err(e) => {
                    error!(error = %e, "Cycle failed, cooling down");
                    self.idle(self.config.execution.round_cooldown_secs).await;
                }
            }
        }

        self.performance
            .lock()
            .expect("performance lock poisoned")
            .log_summary();
        if let Err(e) = self.learning.backup() {
            warn!(error = %e, "Strategy store backup failed at shutdown");
        }
        info!("Engine stopped");
        Ok(())
    }

    /// One full cycle: fan out scans, rank, gate, run positions to
    /// completion, and report.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let pairs = self
            .client
            .get_trading_pairs()
            .await
            .context("listing trading pairs")?;
        let history = self.history.snapshot();

        let mut scans = JoinSet::new();
        for (idx, symbol) in pairs.iter().cloned().enumerate() {
            let scanner = self.scanner.clone();
            let client = Arc::clone(&self.client);
            let stats = history.get(&symbol).cloned();
            scans.spawn(async move {
                let outcome = scanner.scan(client.as_ref(), &symbol, stats.as_ref()).await;
                (idx, outcome)
            });
        }

        let mut candidates: Vec<(usize, ScanResult)> = Vec::new();
        let mut rejects: HashMap<RejectReason, u32> = HashMap::new();
        while let Some(joined) = scans.join_next().await {
            let (idx, outcome) = joined.context("scan task panicked")?;
            match outcome {
                Ok(scan) => candidates.push((idx, scan)),
                Err(reason) => *rejects.entry(reason).or_insert(0) += 1,
            }
        }
        for (reason, count) in &rejects {
            debug!(reason = reason.as_str(), count, "Cycle rejections");
        }

        let mut summary = CycleSummary {
            scanned: pairs.len(),
            candidates: candidates.len(),
            rejected: rejects.values().sum(),
            ..Default::default()
        };

        let selected = rank_candidates(candidates, self.config.execution.max_concurrent_trades);
        if selected.is_empty() {
            return Ok(summary);
        }

        let bankroll = match self
            .client
            .get_balance(&self.config.exchange.quote_asset)
            .await
        {
            Ok(b) => Some(b),
            Err(e) => {
                warn!(error = %e, "Balance fetch failed, Kelly sizing unavailable");
                None
            }
        };
        let perf = self
            .performance
            .lock()
            .expect("performance lock poisoned")
            .snapshot();

        let mut trades = JoinSet::new();
        for scan in selected {
            let strategy = match self
                .learning
                .get_optimal_strategy(&scan.symbol, scan.volatility_pct)
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(symbol = %scan.symbol, error = %e, "Strategy lookup failed");
                    None
                }
            };
            if let Some(plan) = self
                .risk_gate
                .evaluate(&scan, strategy.as_ref(), &perf, bankroll)
            {
                let manager = Arc::clone(&self.manager);
                trades.spawn(async move { manager.run(plan).await });
                summary.launched += 1;
            }
        }

        // Join-before-continue: the next scan starts only after every
        // position launched this round has finished.
        while let Some(joined) = trades.join_next().await {
            match joined.context("position task panicked")? {
                Ok(Some(record)) => {
                    summary.settled += 1;
                    debug!(pair = %record.pair, net = %record.net_pnl, "Round settlement");
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "Position failed"),
            }
        }

        Ok(summary)
    }

    /// Sleep in one-second slices so a shutdown request cuts the wait short.
    async fn idle(&self, secs: u64) {
        for _ in 0..secs {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::exchange::{MockExchange, Ticker};
    use rust_decimal_macros::dec;

    fn scan_at(symbol: &str, strength: Decimal) -> ScanResult {
        ScanResult {
            symbol: symbol.to_string(),
            price: dec!(100),
            spread_pct: dec!(0.1),
            volatility_pct: dec!(4),
            momentum_pct: dec!(1.5),
            volume_usd: dec!(300000),
            range_position: dec!(0.5),
            direction: Direction::Long,
            regime: Regime::Trending,
            trend_score: Decimal::ZERO,
            signal_strength: strength,
            suggested_tp_pct: dec!(1.5),
            suggested_sl_pct: dec!(0.6),
            suggested_hold_seconds: 300,
        }
    }

    #[test]
    fn test_ranking_is_descending_and_capped() {
        let candidates = vec![
            (0, scan_at("A", dec!(0.60))),
            (1, scan_at("B", dec!(0.90))),
            (2, scan_at("C", dec!(0.75))),
        ];
        let ranked = rank_candidates(candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].symbol, "B");
        assert_eq!(ranked[1].symbol, "C");
    }

    #[test]
    fn test_ranking_ties_keep_scan_order() {
        // Join order is arbitrary, so feed the candidates shuffled.
        let candidates = vec![
            (2, scan_at("C", dec!(0.70))),
            (0, scan_at("A", dec!(0.70))),
            (1, scan_at("B", dec!(0.70))),
        ];
        let ranked = rank_candidates(candidates, 3);
        assert_eq!(ranked[0].symbol, "A");
        assert_eq!(ranked[1].symbol, "B");
        assert_eq!(ranked[2].symbol, "C");
    }

    #[test]
    fn test_exit_reason_round_trips() {
        for reason in [
            ExitReason::TakeProfit,
            ExitReason::StopLoss,
            ExitReason::TrailingStop,
            ExitReason::Timeout,
            ExitReason::ErrorExit,
        ] {
            assert_eq!(ExitReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(ExitReason::parse("liquidated"), None);
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), OrderSide::Buy);
        assert_eq!(Direction::Long.exit_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.entry_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.exit_side(), OrderSide::Buy);
    }

    fn trending_ticker(symbol: &str, last: Decimal) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            last,
            bid: last - dec!(0.05),
            ask: last + dec!(0.05),
            high: dec!(103),
            low: dec!(99),
            open: dec!(100),
            volume: dec!(5000),
        }
    }

    fn bullish_candles() -> Vec<crate::exchange::Candle> {
        (0..3)
            .map(|i| crate::exchange::Candle {
                open_time_ms: i * 900_000,
                open: dec!(100) + Decimal::from(i),
                high: dec!(102) + Decimal::from(i),
                low: dec!(99) + Decimal::from(i),
                close: dec!(101) + Decimal::from(i),
                volume: dec!(1000),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_cycle_settles_a_winning_trade() {
        let mock = Arc::new(MockExchange::new(
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            dec!(10000),
        ));
        // BTCUSDT trends up and passes every filter.
        mock.push_ticker("BTCUSDT", trending_ticker("BTCUSDT", dec!(102)));
        mock.set_candles("BTCUSDT", bullish_candles());
        // Entry quote, then a move through the take-profit level.
        mock.push_ticker("BTCUSDT", trending_ticker("BTCUSDT", dec!(102)));
        mock.push_ticker("BTCUSDT", trending_ticker("BTCUSDT", dec!(103.6)));
        // ETHUSDT barely moved: weak momentum rejection.
        mock.push_ticker(
            "ETHUSDT",
            Ticker {
                symbol: "ETHUSDT".to_string(),
                last: dec!(100.2),
                bid: dec!(100.15),
                ask: dec!(100.25),
                high: dec!(102),
                low: dec!(99),
                open: dec!(100),
                volume: dec!(5000),
            },
        );

        let mut config = Config::default();
        config.execution.poll_interval_secs = 0;

        let learning =
            Arc::new(StrategyStore::in_memory(LearningConfig::default()).expect("store"));
        let shutdown = Arc::new(AtomicBool::new(false));
        let engine = Engine::new(Arc::clone(&mock), config, learning, shutdown);

        let summary = engine.run_cycle().await.unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.launched, 1);
        assert_eq!(summary.settled, 1);

        let perf = engine.performance.lock().unwrap().snapshot();
        assert_eq!(perf.total_trades, 1);
        assert!(perf.total_pnl > Decimal::ZERO);
        assert!(engine.history.snapshot().contains_key("BTCUSDT"));
    }
}
