//! Per-pair opportunity scan: sequential filter chain, trend confirmation,
//! regime labelling, composite scoring, and TP/SL/hold suggestion.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::debug;

use crate::config::{ExecutionConfig, ScannerConfig, SignalConfig};
use crate::exchange::ExchangeClient;
use crate::stats::PairStats;
use crate::utils::decimal::{pct_change, safe_div};
use crate::utils::retry::{with_backoff, RetryPolicy};

use super::regime::{self, Regime};
use super::signal::SignalScorer;
use super::Direction;

/// Why a pair was dropped from the cycle. Rejections are expected
/// outcomes, not errors; the engine tallies them per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Blacklisted,
    PoorHistory,
    QuoteUnavailable,
    WideSpread,
    VolatilityOutOfRange,
    LowVolume,
    WeakMomentum,
    NoDirection,
    WeakSignal,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Blacklisted => "blacklisted",
            RejectReason::PoorHistory => "poor_history",
            RejectReason::QuoteUnavailable => "quote_unavailable",
            RejectReason::WideSpread => "wide_spread",
            RejectReason::VolatilityOutOfRange => "volatility_out_of_range",
            RejectReason::LowVolume => "low_volume",
            RejectReason::WeakMomentum => "weak_momentum",
            RejectReason::NoDirection => "no_direction",
            RejectReason::WeakSignal => "weak_signal",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pair's scored opportunity for the current cycle.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub symbol: String,
    pub price: Decimal,
    pub spread_pct: Decimal,
    pub volatility_pct: Decimal,
    pub momentum_pct: Decimal,
    pub volume_usd: Decimal,
    pub range_position: Decimal,
    pub direction: Direction,
    pub regime: Regime,
    pub trend_score: Decimal,
    pub signal_strength: Decimal,
    pub suggested_tp_pct: Decimal,
    pub suggested_sl_pct: Decimal,
    pub suggested_hold_seconds: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct TrendReading {
    score: Decimal,
    bullish: u32,
    bearish: u32,
}

/// Evaluates one pair against live market stats. Pure with respect to
/// shared state: reads the history snapshot, never writes it.
#[derive(Clone)]
pub struct PairScanner {
    config: ScannerConfig,
    scorer: SignalScorer,
    min_hold_seconds: u64,
    default_hold_seconds: u64,
    max_hold_seconds: u64,
    tp_floor_pct: Decimal,
    sl_floor_pct: Decimal,
}

impl PairScanner {
    pub fn new(config: ScannerConfig, signal: SignalConfig, execution: &ExecutionConfig) -> Self {
        let scorer = SignalScorer::new(signal, &config);
        Self {
            config,
            scorer,
            min_hold_seconds: execution.min_hold_seconds,
            default_hold_seconds: execution.default_hold_seconds,
            max_hold_seconds: execution.max_hold_seconds,
            tp_floor_pct: execution.default_tp_pct,
            sl_floor_pct: execution.default_sl_pct,
        }
    }

    /// Run the filter chain for one pair, short-circuiting on the first
    /// failed check.
    pub async fn scan<C>(
        &self,
        client: &C,
        symbol: &str,
        stats: Option<&PairStats>,
    ) -> Result<ScanResult, RejectReason>
    where
        C: ExchangeClient + ?Sized,
    {
        if let Some(s) = stats {
            if s.blacklisted {
                return Err(RejectReason::Blacklisted);
            }
            if s.trade_count >= self.config.min_pair_trades_for_stats
                && s.win_rate < self.config.min_pair_winrate
            {
                return Err(RejectReason::PoorHistory);
            }
        }

        let ticker = match with_backoff(RetryPolicy::default(), "get_ticker", || {
            client.get_ticker(symbol)
        })
        .await
        {
            Ok(t) => t,
            Err(e) => {
                debug!(%symbol, error = %e, "Quote unavailable, skipping pair");
                return Err(RejectReason::QuoteUnavailable);
            }
        };

        let price = ticker.last;
        let spread_pct = safe_div(ticker.ask - ticker.bid, price) * dec!(100);
        if spread_pct > self.config.max_spread_pct {
            return Err(RejectReason::WideSpread);
        }

        let volatility_pct = safe_div(ticker.high - ticker.low, ticker.open) * dec!(100);
        if volatility_pct < self.config.min_volatility_pct
            || volatility_pct > self.config.max_volatility_pct
        {
            return Err(RejectReason::VolatilityOutOfRange);
        }

        let volume_usd = ticker.volume * price;
        if volume_usd < self.config.min_volume_usd {
            return Err(RejectReason::LowVolume);
        }

        let momentum_pct = pct_change(price, ticker.open);
        let range_position = if ticker.high == ticker.low {
            dec!(0.5)
        } else {
            (price - ticker.low) / (ticker.high - ticker.low)
        };
        if momentum_pct.abs() < self.config.min_momentum_pct {
            return Err(RejectReason::WeakMomentum);
        }

        let trend = self.read_trend(client, symbol, price).await;
        let regime = regime::classify(volatility_pct, trend.score, trend.bullish, trend.bearish);

        let is_bullish = momentum_pct > self.config.min_momentum_pct
            && range_position > dec!(0.25)
            && range_position < dec!(0.85);
        let is_bearish = momentum_pct < -self.config.min_momentum_pct
            && range_position > dec!(0.15)
            && range_position < dec!(0.75);

        let direction = if is_bullish {
            Direction::Long
        } else if is_bearish {
            Direction::Short
        } else {
            return Err(RejectReason::NoDirection);
        };

        // A falling trend favors shorts, so the trend score flips sign.
        let trend_score = match direction {
            Direction::Long => trend.score,
            Direction::Short => -trend.score,
        };

        let signal_strength = self.scorer.score(
            momentum_pct,
            volatility_pct,
            spread_pct,
            volume_usd,
            trend_score,
            stats,
        );
        if signal_strength < self.scorer.min_signal_strength() {
            return Err(RejectReason::WeakSignal);
        }

        let (hold, tp, sl) = self.suggest_exit_params(volatility_pct);

        debug!(
            %symbol,
            direction = direction.as_str(),
            regime = %regime,
            strength = %signal_strength,
            momentum = %momentum_pct,
            volatility = %volatility_pct,
            "Pair passed scan"
        );

        Ok(ScanResult {
            symbol: symbol.to_string(),
            price,
            spread_pct,
            volatility_pct,
            momentum_pct,
            volume_usd,
            range_position,
            direction,
            regime,
            trend_score,
            signal_strength,
            suggested_tp_pct: tp,
            suggested_sl_pct: sl,
            suggested_hold_seconds: hold,
        })
    }

    /// TP/SL/hold suggestion tiered by volatility: fast markets get short
    /// holds and targets proportional to the day's range, slow markets get
    /// floors so targets stay clear of fees.
    fn suggest_exit_params(&self, volatility_pct: Decimal) -> (u64, Decimal, Decimal) {
        let (hold, tp, sl) = if volatility_pct > dec!(10) {
            (
                self.min_hold_seconds,
                dec!(0.20) * volatility_pct,
                dec!(0.08) * volatility_pct,
            )
        } else if volatility_pct > dec!(5) {
            (
                self.default_hold_seconds,
                dec!(0.25) * volatility_pct,
                dec!(0.10) * volatility_pct,
            )
        } else {
            (
                self.max_hold_seconds / 2,
                (dec!(0.35) * volatility_pct).max(self.tp_floor_pct),
                (dec!(0.15) * volatility_pct).max(self.sl_floor_pct),
            )
        };
        (hold, tp.max(dec!(1.2)), sl.max(dec!(0.6)))
    }

    /// Best-effort trend confirmation from recent candles. Candle fetch
    /// failures never fail the scan.
    async fn read_trend<C>(&self, client: &C, symbol: &str, price: Decimal) -> TrendReading
    where
        C: ExchangeClient + ?Sized,
    {
        let candles = match client
            .get_ohlc(
                symbol,
                self.config.trend_interval_minutes,
                self.config.trend_candles,
            )
            .await
        {
            Ok(c) => c,
            Err(e) => {
                debug!(%symbol, error = %e, "Candle fetch failed, trend skipped");
                return TrendReading::default();
            }
        };
        if candles.is_empty() {
            return TrendReading::default();
        }

        let bullish = candles.iter().filter(|c| c.is_bullish()).count() as u32;
        let bearish = candles.iter().filter(|c| c.is_bearish()).count() as u32;

        let mut score = if bullish >= 3 {
            dec!(0.15)
        } else if bullish >= 2 {
            dec!(0.08)
        } else if bearish >= 3 {
            dec!(-0.10)
        } else {
            Decimal::ZERO
        };

        if let Some(window_low) = candles.iter().map(|c| c.low).min() {
            if price > window_low * dec!(1.01) {
                score += dec!(0.05);
            }
        }

        TrendReading {
            score,
            bullish,
            bearish,
        }
    }
}
