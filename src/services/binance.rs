use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::candle::{Candle, KlineRow};

const BINANCE_FUTURES_API_URL: &str = "https://fapi.binance.com";
/// Hard cap on klines per request
const MAX_KLINES: usize = 1500;

/// Anything that can hand back an ordered candle window for a pair.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, AppError>;
}

/// Binance USDⓈ-M futures kline client
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceFuturesClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_FUTURES_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn request_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<KlineRow>, reqwest::Error> {
        let limit = limit.min(MAX_KLINES).to_string();
        let symbol = symbol.to_uppercase();

        self.client
            .get(format!("{}/fapi/v1/klines", self.base_url))
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", interval),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<KlineRow>>()
            .await
    }
}

impl Default for BinanceFuturesClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleSource for BinanceFuturesClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, AppError> {
        let rows = self
            .request_klines(symbol, interval, limit)
            .await
            .map_err(|error| AppError::Fetch {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                message: error.without_url().to_string(),
            })?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }
}

/// Drop a trailing candle that has not closed yet.
pub fn closed_candles(mut candles: Vec<Candle>, now_ms: u64) -> Vec<Candle> {
    if candles.last().is_some_and(|c| c.close_time > now_ms) {
        candles.pop();
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_closing_at(close_time: u64) -> Candle {
        Candle::new(close_time - 59_999, close_time, 1.0, 2.0, 0.5, 1.5, 10.0, 15.0, 5, 4.0)
    }

    #[test]
    fn closed_candles_drops_forming_tail() {
        let candles = vec![candle_closing_at(59_999), candle_closing_at(119_999)];
        let closed = closed_candles(candles, 100_000);

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_time, 59_999);
    }

    #[test]
    fn closed_candles_keeps_closed_tail() {
        let candles = vec![candle_closing_at(59_999), candle_closing_at(119_999)];
        assert_eq!(closed_candles(candles, 120_000).len(), 2);
    }

    #[test]
    fn base_url_is_normalized() {
        let client = BinanceFuturesClient::with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
