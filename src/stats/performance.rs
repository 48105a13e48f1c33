//! Aggregate performance tracking and Kelly-based position sizing.

use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tracing::info;

use crate::config::SizingConfig;
use crate::engine::{ExitReason, TradeRecord};
use crate::utils::decimal::clamp;

const RECENT_WINDOW: usize = 50;

/// Running totals across every settled trade, plus the inputs the Kelly
/// sizer needs (win rate, average win, average loss magnitude).
pub struct PerformanceTracker {
    config: SizingConfig,
    total_trades: u64,
    winning_trades: u64,
    losing_trades: u64,
    total_pnl: Decimal,
    /// Incremental mean of winning trades' net pnl.
    avg_win: Decimal,
    /// Incremental mean of losing trades' net pnl magnitude (positive).
    avg_loss: Decimal,
    recent_pnl: VecDeque<Decimal>,
    peak_pnl: Decimal,
    max_drawdown: Decimal,
    exit_reasons: HashMap<ExitReason, u64>,
}

/// Point-in-time copy handed to scanners and the risk gate each cycle.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    pub total_trades: u64,
    pub win_rate: Decimal,
    pub kelly_fraction: Decimal,
    pub total_pnl: Decimal,
    pub max_drawdown: Decimal,
}

impl PerformanceTracker {
    pub fn new(config: SizingConfig) -> Self {
        Self {
            config,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            total_pnl: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            recent_pnl: VecDeque::with_capacity(RECENT_WINDOW),
            peak_pnl: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            exit_reasons: HashMap::new(),
        }
    }

    /// Fold one settled trade into the running totals.
    pub fn record(&mut self, trade: &TradeRecord) {
        self.total_trades += 1;
        self.total_pnl += trade.net_pnl;

        if trade.is_win() {
            self.winning_trades += 1;
            let n = Decimal::from(self.winning_trades);
            self.avg_win = self.avg_win * (n - Decimal::ONE) / n + trade.net_pnl / n;
        } else {
            self.losing_trades += 1;
            let n = Decimal::from(self.losing_trades);
            self.avg_loss = self.avg_loss * (n - Decimal::ONE) / n + trade.net_pnl.abs() / n;
        }

        if self.recent_pnl.len() == RECENT_WINDOW {
            self.recent_pnl.pop_front();
        }
        self.recent_pnl.push_back(trade.net_pnl);

        if self.total_pnl > self.peak_pnl {
            self.peak_pnl = self.total_pnl;
        }
        let drawdown = self.peak_pnl - self.total_pnl;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }

        *self.exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;

        info!(
            trades = self.total_trades,
            win_rate = %self.win_rate(),
            total_pnl = %self.total_pnl,
            max_drawdown = %self.max_drawdown,
            exit = trade.exit_reason.as_str(),
            "Performance updated"
        );
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    pub fn win_rate(&self) -> Decimal {
        if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.total_trades)
        }
    }

    /// Fraction of bankroll to deploy per trade.
    ///
    /// Kelly needs both winners and losers on the books; before that (or
    /// before the minimum sample) the configured default applies. The raw
    /// Kelly value is clamped to [0, 1], scaled by the multiplier, and
    /// capped.
    pub fn kelly_fraction(&self) -> Decimal {
        if self.total_trades < self.config.min_trades_for_kelly
            || self.winning_trades == 0
            || self.losing_trades == 0
            || self.avg_loss == Decimal::ZERO
        {
            return self.config.default_kelly;
        }

        let p = self.win_rate();
        let q = Decimal::ONE - p;
        let b = (self.avg_win / self.avg_loss).abs();
        if b == Decimal::ZERO {
            return self.config.default_kelly;
        }

        let kelly = clamp((p * b - q) / b, Decimal::ZERO, Decimal::ONE);
        (kelly * self.config.kelly_multiplier).min(self.config.kelly_cap)
    }

    /// Kelly-sized notional, clamped to the configured position bounds.
    pub fn optimal_size(&self, bankroll: Decimal) -> Decimal {
        clamp(
            bankroll * self.kelly_fraction(),
            self.config.min_position_usd,
            self.config.max_position_usd,
        )
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            total_trades: self.total_trades,
            win_rate: self.win_rate(),
            kelly_fraction: self.kelly_fraction(),
            total_pnl: self.total_pnl,
            max_drawdown: self.max_drawdown,
        }
    }

    /// Log the session scoreboard, usually at shutdown.
    pub fn log_summary(&self) {
        info!(
            trades = self.total_trades,
            wins = self.winning_trades,
            losses = self.losing_trades,
            win_rate = %self.win_rate(),
            total_pnl = %self.total_pnl,
            max_drawdown = %self.max_drawdown,
            "Session performance"
        );
        for (reason, count) in &self.exit_reasons {
            info!(exit = reason.as_str(), count, "Exit reason tally");
        }
    }
}
