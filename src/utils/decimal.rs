//! Decimal arithmetic helpers for price math.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Safe division that returns zero if the divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Percentage change from `base` to `value`, in percent units.
pub fn pct_change(value: Decimal, base: Decimal) -> Decimal {
    safe_div(value - base, base) * dec!(100)
}

/// Clamp a value to a closed range.
pub fn clamp(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}
