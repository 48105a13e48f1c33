//! Market regime classification from a pair's volatility and trend reading.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

/// Coarse market state used to adjust (or veto) a trade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
    Quiet,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
            Regime::Quiet => "quiet",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a pair's regime. Checks run in priority order: extreme
/// volatility first, then dead markets, then directional conviction.
/// The volatility comparisons are strict, so exactly 8% or exactly 2%
/// falls through to the trend checks.
pub fn classify(
    volatility_pct: Decimal,
    trend_score: Decimal,
    bullish_candles: u32,
    bearish_candles: u32,
) -> Regime {
    if volatility_pct > dec!(8.0) {
        return Regime::Volatile;
    }
    if volatility_pct < dec!(2.0) {
        return Regime::Quiet;
    }
    if trend_score.abs() > dec!(0.10) || bullish_candles >= 3 || bearish_candles >= 3 {
        return Regime::Trending;
    }
    Regime::Ranging
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extreme_volatility_wins_over_trend() {
        assert_eq!(classify(dec!(9), dec!(0.2), 4, 0), Regime::Volatile);
        assert_eq!(classify(dec!(12), dec!(0), 0, 0), Regime::Volatile);
    }

    #[test]
    fn test_quiet_below_two_percent() {
        assert_eq!(classify(dec!(1.5), dec!(0.2), 4, 0), Regime::Quiet);
        assert_eq!(classify(dec!(0), dec!(0), 0, 0), Regime::Quiet);
    }

    #[test]
    fn test_boundary_volatility_falls_through() {
        // Exactly 8 is not volatile, exactly 2 is not quiet.
        assert_eq!(classify(dec!(8.0), dec!(0), 0, 0), Regime::Ranging);
        assert_eq!(classify(dec!(2.0), dec!(0), 0, 0), Regime::Ranging);
        assert_eq!(classify(dec!(8.0), dec!(0.15), 0, 0), Regime::Trending);
    }

    #[test]
    fn test_trending_on_score_or_candle_run() {
        assert_eq!(classify(dec!(4), dec!(0.15), 0, 0), Regime::Trending);
        assert_eq!(classify(dec!(4), dec!(-0.15), 0, 0), Regime::Trending);
        assert_eq!(classify(dec!(4), dec!(0), 3, 0), Regime::Trending);
        assert_eq!(classify(dec!(4), dec!(0), 0, 3), Regime::Trending);
        // |0.10| is not strictly greater than 0.10
        assert_eq!(classify(dec!(4), dec!(0.10), 2, 2), Regime::Ranging);
    }

    #[test]
    fn test_classification_is_stable() {
        // Same inputs always yield the same regime.
        let a = classify(dec!(5), dec!(0.05), 2, 1);
        let b = classify(dec!(5), dec!(0.05), 2, 1);
        assert_eq!(a, b);
        assert_eq!(a, Regime::Ranging);
    }
}
