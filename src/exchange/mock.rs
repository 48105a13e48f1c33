//! Scripted mock exchange for tests.
//!
//! Price sequences are queued per symbol; when a script runs dry the last
//! price repeats, which keeps long monitoring loops alive without endless
//! fixture setup. `None` entries simulate quote-fetch failures.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::exchange::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use crate::exchange::types::{Candle, OrderResponse, OrderSide, OrderStatus, Ticker};

/// Build a synthetic ticker centred on one price.
pub fn ticker_at(symbol: &str, price: Decimal) -> Ticker {
    Ticker {
        symbol: symbol.to_string(),
        last: price,
        bid: price,
        ask: price,
        high: price * dec!(1.05),
        low: price * dec!(0.95),
        open: price,
        volume: dec!(10000),
    }
}

pub struct MockExchange {
    pairs: Vec<String>,
    tickers: Mutex<HashMap<String, VecDeque<Option<Ticker>>>>,
    last_ticker: Mutex<HashMap<String, Ticker>>,
    candles: Mutex<HashMap<String, Vec<Candle>>>,
    fail_candles: AtomicBool,
    reject_orders: AtomicBool,
    balance: Mutex<Decimal>,
    order_seq: AtomicU64,
    /// Every order placed, for assertions.
    pub orders: Mutex<Vec<OrderResponse>>,
}

impl MockExchange {
    pub fn new(pairs: Vec<String>, balance: Decimal) -> Self {
        Self {
            pairs,
            tickers: Mutex::new(HashMap::new()),
            last_ticker: Mutex::new(HashMap::new()),
            candles: Mutex::new(HashMap::new()),
            fail_candles: AtomicBool::new(false),
            reject_orders: AtomicBool::new(false),
            balance: Mutex::new(balance),
            order_seq: AtomicU64::new(1),
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Queue a full ticker for the next `get_ticker` call.
    pub fn push_ticker(&self, symbol: &str, ticker: Ticker) {
        self.tickers
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push_back(Some(ticker));
    }

    /// Queue a synthetic ticker at `price`.
    pub fn push_price(&self, symbol: &str, price: Decimal) {
        self.push_ticker(symbol, ticker_at(symbol, price));
    }

    /// Queue a quote-fetch failure.
    pub fn push_failure(&self, symbol: &str) {
        self.tickers
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push_back(None);
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles
            .lock()
            .unwrap()
            .insert(symbol.to_string(), candles);
    }

    pub fn fail_candles(&self, fail: bool) {
        self.fail_candles.store(fail, Ordering::SeqCst);
    }

    pub fn reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker
            .lock()
            .unwrap()
            .get(symbol)
            .map(|t| t.last)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_trading_pairs(&self) -> ExchangeResult<Vec<String>> {
        Ok(self.pairs.clone())
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let next = self
            .tickers
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|q| q.pop_front());

        match next {
            Some(Some(ticker)) => {
                self.last_ticker
                    .lock()
                    .unwrap()
                    .insert(symbol.to_string(), ticker.clone());
                Ok(ticker)
            }
            Some(None) => Err(ExchangeError::Other(format!(
                "scripted quote failure for {symbol}"
            ))),
            None => {
                // Script exhausted: repeat the last known ticker.
                self.last_ticker
                    .lock()
                    .unwrap()
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| ExchangeError::Other(format!("no script for {symbol}")))
            }
        }
    }

    async fn get_ohlc(
        &self,
        symbol: &str,
        _interval_minutes: u32,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        if self.fail_candles.load(Ordering::SeqCst) {
            return Err(ExchangeError::Other("scripted candle failure".into()));
        }
        let candles = self
            .candles
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        Ok(candles.into_iter().rev().take(limit as usize).rev().collect())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderResponse> {
        let status = if self.reject_orders.load(Ordering::SeqCst) {
            OrderStatus::Rejected
        } else {
            OrderStatus::Filled
        };
        let fill_price = self
            .current_price(symbol)
            .ok_or_else(|| ExchangeError::Other(format!("no price for {symbol}")))?;

        let response = OrderResponse {
            order_id: self.order_seq.fetch_add(1, Ordering::SeqCst),
            symbol: symbol.to_string(),
            side,
            status,
            fill_price,
            executed_qty: amount,
        };
        self.orders.lock().unwrap().push(response.clone());
        Ok(response)
    }

    async fn get_balance(&self, _currency: &str) -> ExchangeResult<Decimal> {
        Ok(*self.balance.lock().unwrap())
    }
}
