//! Exchange integrations: live REST client, paper wrapper, and test mock.

mod client;
pub mod mock;
mod paper;
mod traits;
mod types;

pub use client::BinanceClient;
pub use mock::MockExchange;
pub use paper::PaperExchange;
pub use traits::{ExchangeClient, ExchangeError, ExchangeResult};
pub use types::{Candle, OrderResponse, OrderSide, OrderStatus, Ticker};
