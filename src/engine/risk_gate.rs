//! Pre-trade viability check: sizing, override resolution, regime
//! adjustment, and the fee-feasibility gate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::{ExecutionConfig, FeeConfig, SizingConfig};
use crate::stats::PerformanceSnapshot;
use crate::utils::decimal::clamp;

use super::regime::Regime;
use super::scanner::ScanResult;
use super::{Direction, StrategyOverride};

/// Fully resolved parameters for one trade, ready for execution.
#[derive(Debug, Clone)]
pub struct TradePlan {
    pub symbol: String,
    pub direction: Direction,
    pub position_usd: Decimal,
    pub tp_pct: Decimal,
    pub sl_pct: Decimal,
    pub hold_seconds: u64,
    /// Carried from the scan for the settlement record.
    pub volatility_pct: Decimal,
    pub spread_pct: Decimal,
}

pub struct RiskGate {
    execution: ExecutionConfig,
    fees: FeeConfig,
    sizing: SizingConfig,
}

impl RiskGate {
    pub fn new(execution: ExecutionConfig, fees: FeeConfig, sizing: SizingConfig) -> Self {
        Self {
            execution,
            fees,
            sizing,
        }
    }

    /// Decide whether a selected opportunity is worth entering, and with
    /// what parameters. `None` is a silent no-trade outcome, never an
    /// error, and produces no trade record.
    pub fn evaluate(
        &self,
        scan: &ScanResult,
        strategy: Option<&StrategyOverride>,
        perf: &PerformanceSnapshot,
        bankroll: Option<Decimal>,
    ) -> Option<TradePlan> {
        let validated = strategy.map(|s| s.validated).unwrap_or(false);

        let mut position_usd = self.resolve_size(strategy, perf, bankroll);
        let mut tp_pct = strategy
            .and_then(|s| s.tp_pct)
            .unwrap_or(scan.suggested_tp_pct);
        let mut sl_pct = strategy
            .and_then(|s| s.sl_pct)
            .unwrap_or(scan.suggested_sl_pct);
        let mut hold_seconds = strategy
            .and_then(|s| s.hold_seconds)
            .unwrap_or(scan.suggested_hold_seconds)
            .clamp(
                self.execution.min_hold_seconds,
                self.execution.max_hold_seconds,
            );

        match scan.regime {
            Regime::Quiet => {
                info!(symbol = %scan.symbol, "Quiet regime, entry refused");
                return None;
            }
            Regime::Volatile => {
                position_usd /= dec!(2);
                sl_pct *= dec!(1.5);
            }
            Regime::Trending => {
                hold_seconds = (hold_seconds * 2).min(self.execution.max_hold_seconds);
            }
            Regime::Ranging => {
                tp_pct *= dec!(0.8);
            }
        }

        let fee_pct = self.fees.round_trip_rate * dec!(100);
        let min_tp = fee_pct + self.fees.buffer_pct;
        if tp_pct < min_tp {
            info!(
                symbol = %scan.symbol,
                tp = %tp_pct,
                required = %min_tp,
                "Target below fee floor, entry refused"
            );
            return None;
        }

        // Modeled edge uses a conservative win probability unless the
        // learning store has validated this pair's pattern.
        let win_prob = if validated { dec!(0.55) } else { dec!(0.50) };
        let edge = tp_pct * win_prob - sl_pct * (Decimal::ONE - win_prob);
        if edge < fee_pct {
            info!(
                symbol = %scan.symbol,
                edge = %edge,
                fee = %fee_pct,
                "Expected edge below fees, entry refused"
            );
            return None;
        }

        debug!(
            symbol = %scan.symbol,
            size = %position_usd,
            tp = %tp_pct,
            sl = %sl_pct,
            hold = hold_seconds,
            regime = %scan.regime,
            "Trade plan approved"
        );

        Some(TradePlan {
            symbol: scan.symbol.clone(),
            direction: scan.direction,
            position_usd,
            tp_pct,
            sl_pct,
            hold_seconds,
            volatility_pct: scan.volatility_pct,
            spread_pct: scan.spread_pct,
        })
    }

    /// Size precedence: Kelly once the sample is big enough, then a
    /// validated override, then the configured base.
    fn resolve_size(
        &self,
        strategy: Option<&StrategyOverride>,
        perf: &PerformanceSnapshot,
        bankroll: Option<Decimal>,
    ) -> Decimal {
        if perf.total_trades >= self.sizing.min_trades_for_kelly {
            if let Some(bankroll) = bankroll {
                return clamp(
                    bankroll * perf.kelly_fraction,
                    self.sizing.min_position_usd,
                    self.sizing.max_position_usd,
                );
            }
        }
        if let Some(s) = strategy {
            if s.validated {
                if let Some(size) = s.position_usd {
                    return size;
                }
            }
        }
        self.execution.base_position_usd
    }
}
