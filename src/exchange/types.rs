//! Type definitions for exchange API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single quote snapshot for one instrument.
///
/// `open`, `high` and `low` refer to the rolling 24h window, which is what
/// the scanner's volatility and momentum math is defined over.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(rename = "lastPrice", with = "rust_decimal::serde::str")]
    pub last: Decimal,
    #[serde(rename = "bidPrice", with = "rust_decimal::serde::str")]
    pub bid: Decimal,
    #[serde(rename = "askPrice", with = "rust_decimal::serde::str")]
    pub ask: Decimal,
    #[serde(rename = "highPrice", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "lowPrice", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "openPrice", with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// One OHLC candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// A candle closes bullish when it closes above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// A candle closes bearish when it closes below its open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Order side for market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that unwinds this one.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// Result of a market order placement.
#[derive(Debug, Clone)]
pub struct OrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Average fill price across all fills.
    pub fill_price: Decimal,
    pub executed_qty: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ticker_parses_exchange_strings() {
        let raw = r#"{
            "symbol": "BTCUSDT",
            "lastPrice": "50000.10",
            "bidPrice": "49999.90",
            "askPrice": "50000.30",
            "highPrice": "51000.00",
            "lowPrice": "49000.00",
            "openPrice": "49500.00",
            "volume": "12345.678"
        }"#;
        let ticker: Ticker = serde_json::from_str(raw).unwrap();
        assert_eq!(ticker.last, dec!(50000.10));
        assert_eq!(ticker.open, dec!(49500.00));
        assert_eq!(ticker.volume, dec!(12345.678));
    }

    #[test]
    fn test_candle_direction() {
        let candle = Candle {
            open_time_ms: 0,
            open: dec!(100),
            high: dec!(110),
            low: dec!(99),
            close: dec!(105),
            volume: dec!(10),
        };
        assert!(candle.is_bullish());
        assert!(!candle.is_bearish());
    }

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }
}
