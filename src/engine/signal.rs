//! Composite signal scoring for scanned pairs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{ScannerConfig, SignalConfig};
use crate::stats::PairStats;
use crate::utils::decimal::clamp;

const HISTORY_MIN_TRADES: u32 = 3;

/// Weighted blend of momentum, volume, spread, volatility, trend, and
/// historical edge. Each sub-score is normalized to [0, 1] before
/// weighting; the trend score enters at full weight, signed.
#[derive(Clone)]
pub struct SignalScorer {
    weights: SignalConfig,
    max_spread_pct: Decimal,
    volume_norm_usd: Decimal,
}

impl SignalScorer {
    pub fn new(weights: SignalConfig, scanner: &ScannerConfig) -> Self {
        Self {
            weights,
            max_spread_pct: scanner.max_spread_pct,
            volume_norm_usd: scanner.volume_norm_usd,
        }
    }

    pub fn min_signal_strength(&self) -> Decimal {
        self.weights.min_signal_strength
    }

    /// Composite score. For short setups the caller negates the trend
    /// score first, so downtrends reinforce rather than penalize.
    pub fn score(
        &self,
        momentum_pct: Decimal,
        volatility_pct: Decimal,
        spread_pct: Decimal,
        volume_usd: Decimal,
        trend_score: Decimal,
        stats: Option<&PairStats>,
    ) -> Decimal {
        let momentum = (momentum_pct.abs() / dec!(2)).min(Decimal::ONE);
        let volatility = (volatility_pct / dec!(5)).min(Decimal::ONE);
        let spread = clamp(
            Decimal::ONE - spread_pct / self.max_spread_pct,
            Decimal::ZERO,
            Decimal::ONE,
        );
        let volume = (volume_usd / self.volume_norm_usd).min(Decimal::ONE);

        let history_bonus = match stats {
            Some(s) if s.trade_count >= HISTORY_MIN_TRADES => {
                (s.win_rate - dec!(0.5)) * dec!(0.5)
            }
            _ => Decimal::ZERO,
        };

        self.weights.weight_momentum * momentum
            + self.weights.weight_volume * volume
            + trend_score
            + self.weights.weight_spread * spread
            + self.weights.weight_volatility * volatility
            + self.weights.weight_history * history_bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> SignalScorer {
        SignalScorer::new(SignalConfig::default(), &ScannerConfig::default())
    }

    #[test]
    fn test_saturated_inputs_hit_weight_ceiling() {
        // Max momentum, volatility, volume, zero spread, no trend/history:
        // 0.40 + 0.20 + 0.10 + 0.10 = 0.80.
        let score = scorer().score(
            dec!(5),
            dec!(10),
            Decimal::ZERO,
            dec!(1000000),
            Decimal::ZERO,
            None,
        );
        assert_eq!(score, dec!(0.80));
    }

    #[test]
    fn test_momentum_sign_does_not_matter() {
        let s = scorer();
        let up = s.score(dec!(1.2), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, None);
        let down = s.score(dec!(-1.2), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, None);
        assert_eq!(up, down);
    }

    #[test]
    fn test_trend_score_enters_signed() {
        let s = scorer();
        let base = s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, None);
        let with_trend = s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), dec!(0.15), None);
        let against = s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), dec!(-0.10), None);
        assert_eq!(with_trend - base, dec!(0.15));
        assert_eq!(base - against, dec!(0.10));
    }

    #[test]
    fn test_history_bonus_needs_sample() {
        let s = scorer();
        let thin = PairStats {
            trade_count: 2,
            win_rate: dec!(1.0),
            ..Default::default()
        };
        let proven = PairStats {
            trade_count: 10,
            win_rate: dec!(0.7),
            ..Default::default()
        };
        let losing = PairStats {
            trade_count: 10,
            win_rate: dec!(0.3),
            ..Default::default()
        };

        let base = s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, None);
        let with_thin =
            s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, Some(&thin));
        let with_proven =
            s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, Some(&proven));
        let with_losing =
            s.score(dec!(1), dec!(4), dec!(0.1), dec!(150000), Decimal::ZERO, Some(&losing));

        assert_eq!(with_thin, base);
        // (0.7 - 0.5) * 0.5 * 0.05 = 0.005
        assert_eq!(with_proven - base, dec!(0.005));
        // Losing history subtracts.
        assert!(with_losing < base);
    }

    #[test]
    fn test_wide_spread_contributes_nothing() {
        let s = scorer();
        // Spread at twice the max clamps the sub-score to zero rather
        // than going negative.
        let wide = s.score(dec!(1), dec!(4), dec!(0.6), dec!(150000), Decimal::ZERO, None);
        let at_max = s.score(dec!(1), dec!(4), dec!(0.3), dec!(150000), Decimal::ZERO, None);
        assert_eq!(wide, at_max);
    }
}
