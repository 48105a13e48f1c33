//! Binance spot REST API client.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use crate::config::ExchangeConfig;
use crate::exchange::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use crate::exchange::types::{Candle, OrderResponse, OrderSide, OrderStatus, Ticker};

const SPOT_BASE_URL: &str = "https://api.binance.com";
const SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";

/// Binance spot market client.
pub struct BinanceClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    quote_asset: String,
    is_spot_trading_allowed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrderResponse {
    order_id: u64,
    symbol: String,
    status: OrderStatus,
    #[serde(with = "rust_decimal::serde::str")]
    executed_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    cummulative_quote_qty: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    free: Decimal,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(rename = "msg")]
    message: String,
}

impl BinanceClient {
    /// Create a new client from configuration.
    pub fn new(config: &ExchangeConfig) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let base_url = if config.testnet {
            SPOT_TESTNET_URL.to_string()
        } else {
            SPOT_BASE_URL.to_string()
        };

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url,
            quote_asset: config.quote_asset.clone(),
        })
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => Err(ExchangeError::Api {
                    code: err.code,
                    message: err.message,
                }),
                Err(_) => Err(ExchangeError::Malformed(body)),
            }
        }
    }

    fn decimal_field(value: &serde_json::Value) -> ExchangeResult<Decimal> {
        value
            .as_str()
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| ExchangeError::Malformed(format!("expected decimal, got {value}")))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    #[instrument(skip(self))]
    async fn get_trading_pairs(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.http.get(&url).send().await?;
        let info: ExchangeInfo = Self::decode(response).await?;

        let pairs: Vec<String> = info
            .symbols
            .into_iter()
            .filter(|s| {
                s.status == "TRADING"
                    && s.quote_asset == self.quote_asset
                    && s.is_spot_trading_allowed
            })
            .map(|s| s.symbol)
            .collect();

        debug!(count = pairs.len(), "Fetched trading pairs");
        Ok(pairs)
    }

    #[instrument(skip(self))]
    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url,
            urlencoding::encode(symbol)
        );
        let response = self.http.get(&url).send().await?;
        Self::decode(response).await
    }

    #[instrument(skip(self))]
    async fn get_ohlc(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}m&limit={}",
            self.base_url,
            urlencoding::encode(symbol),
            interval_minutes,
            limit
        );
        let response = self.http.get(&url).send().await?;
        let rows: Vec<Vec<serde_json::Value>> = Self::decode(response).await?;

        rows.into_iter()
            .map(|row| {
                if row.len() < 6 {
                    return Err(ExchangeError::Malformed(format!(
                        "kline row too short ({} fields)",
                        row.len()
                    )));
                }
                Ok(Candle {
                    open_time_ms: row[0].as_i64().unwrap_or_default(),
                    open: Self::decimal_field(&row[1])?,
                    high: Self::decimal_field(&row[2])?,
                    low: Self::decimal_field(&row[3])?,
                    close: Self::decimal_field(&row[4])?,
                    volume: Self::decimal_field(&row[5])?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderResponse> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&timestamp={}",
            urlencoding::encode(symbol),
            side.as_str(),
            amount.round_dp(6),
            Self::timestamp()
        );
        let signature = self.sign(&query);
        let url = format!(
            "{}/api/v3/order?{}&signature={}",
            self.base_url, query, signature
        );

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let raw: RawOrderResponse = Self::decode(response).await?;

        let fill_price = if raw.executed_qty > Decimal::ZERO {
            raw.cummulative_quote_qty / raw.executed_qty
        } else {
            Decimal::ZERO
        };

        Ok(OrderResponse {
            order_id: raw.order_id,
            symbol: raw.symbol,
            side,
            status: raw.status,
            fill_price,
            executed_qty: raw.executed_qty,
        })
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, currency: &str) -> ExchangeResult<Decimal> {
        let query = format!("timestamp={}", Self::timestamp());
        let signature = self.sign(&query);
        let url = format!(
            "{}/api/v3/account?{}&signature={}",
            self.base_url, query, signature
        );

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let account: AccountInfo = Self::decode(response).await?;

        account
            .balances
            .into_iter()
            .find(|b| b.asset == currency)
            .map(|b| b.free)
            .ok_or_else(|| ExchangeError::Other(format!("no balance entry for {currency}")))
    }
}
