//! Paper-trading wrapper: real market data, simulated fills.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use crate::exchange::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use crate::exchange::types::{Candle, OrderResponse, OrderSide, OrderStatus, Ticker};

/// Wraps any exchange client, passing market-data calls through and
/// simulating order fills at the current last price against a paper balance.
pub struct PaperExchange<C> {
    inner: C,
    balance: RwLock<Decimal>,
    /// Per-side fee rate applied to simulated fills.
    fee_rate_per_side: Decimal,
    order_seq: AtomicU64,
}

impl<C: ExchangeClient> PaperExchange<C> {
    pub fn new(inner: C, starting_balance: Decimal, fee_rate_per_side: Decimal) -> Self {
        Self {
            inner,
            balance: RwLock::new(starting_balance),
            fee_rate_per_side,
            order_seq: AtomicU64::new(1),
        }
    }

    pub async fn paper_balance(&self) -> Decimal {
        *self.balance.read().await
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for PaperExchange<C> {
    async fn get_trading_pairs(&self) -> ExchangeResult<Vec<String>> {
        self.inner.get_trading_pairs().await
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        self.inner.get_ticker(symbol).await
    }

    async fn get_ohlc(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        self.inner.get_ohlc(symbol, interval_minutes, limit).await
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderResponse> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::Other("order amount must be positive".into()));
        }

        // Fill at the live last price so paper results track the real market.
        let ticker = self.inner.get_ticker(symbol).await?;
        let fill_price = ticker.last;
        let notional = fill_price * amount;
        let fee = notional * self.fee_rate_per_side;

        let mut balance = self.balance.write().await;
        match side {
            OrderSide::Buy => *balance -= notional + fee,
            OrderSide::Sell => *balance += notional - fee,
        }

        let order_id = self.order_seq.fetch_add(1, Ordering::SeqCst);
        info!(
            %symbol,
            %side,
            %amount,
            %fill_price,
            balance = %*balance,
            "Paper order filled"
        );

        Ok(OrderResponse {
            order_id,
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::Filled,
            fill_price,
            executed_qty: amount,
        })
    }

    async fn get_balance(&self, _currency: &str) -> ExchangeResult<Decimal> {
        Ok(*self.balance.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_paper_fill_debits_notional_and_fee() {
        let mock = MockExchange::new(vec!["BTCUSDT".into()], dec!(0));
        mock.push_price("BTCUSDT", dec!(100));
        mock.push_price("BTCUSDT", dec!(100));

        let paper = PaperExchange::new(mock, dec!(1000), dec!(0.004));
        let order = paper
            .place_market_order("BTCUSDT", OrderSide::Buy, dec!(2))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.fill_price, dec!(100));
        // 1000 - 200 notional - 0.8 fee
        assert_eq!(paper.paper_balance().await, dec!(799.2));
    }

    #[tokio::test]
    async fn test_paper_round_trip_nets_pnl() {
        let mock = MockExchange::new(vec!["ETHUSDT".into()], dec!(0));
        mock.push_price("ETHUSDT", dec!(100));
        mock.push_price("ETHUSDT", dec!(110));

        let paper = PaperExchange::new(mock, dec!(1000), dec!(0));
        paper
            .place_market_order("ETHUSDT", OrderSide::Buy, dec!(1))
            .await
            .unwrap();
        paper
            .place_market_order("ETHUSDT", OrderSide::Sell, dec!(1))
            .await
            .unwrap();

        // Bought at 100, sold at 110, no fees: +10.
        assert_eq!(paper.paper_balance().await, dec!(1010));
    }
}
