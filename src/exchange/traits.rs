//! Venue-agnostic trait for market data and order execution.
//!
//! The engine never talks to a concrete exchange type; everything goes
//! through `ExchangeClient` so the same pipeline runs against the live
//! REST client, the paper-trading wrapper, or a scripted mock in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{Candle, OrderResponse, OrderSide, Ticker};

/// Typed exchange failure, so retry logic can tell transport trouble apart
/// from a venue-side rejection.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Market data and execution surface consumed by the engine.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// All tradable instrument identifiers in the configured quote currency.
    async fn get_trading_pairs(&self) -> ExchangeResult<Vec<String>>;

    /// Current quote for one instrument (last/bid/ask/high/low/open/volume).
    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;

    /// Most recent `limit` candles at `interval_minutes` granularity,
    /// oldest first.
    async fn get_ohlc(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Place a market order for `amount` base units.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderResponse>;

    /// Free balance for a currency (e.g. "USDT").
    async fn get_balance(&self, currency: &str) -> ExchangeResult<Decimal>;
}
