use serde::{de::IgnoredAny, Deserialize, Serialize};

/// One closed (or still forming) kline, oldest first in every window we hand around.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Candle open time (epoch ms)
    pub open_time: u64,
    /// Candle close time (epoch ms)
    pub close_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base asset volume
    pub volume: f64,
    /// Quote asset volume
    pub quote_volume: f64,
    /// Number of trades
    pub num_trades: u64,
    /// Base volume bought by takers
    pub taker_buy_volume: f64,
    /// close - open
    pub price_change: f64,
    pub price_change_percent: f64,
    /// (high - low) / open, in percent
    pub amplitude: f64,
    /// Quote volume / volume
    pub avg_price: f64,
    /// Taker buy volume / volume
    pub buy_ratio: f64,
}

impl Candle {
    /// Build a candle from raw prices and fill in the derived fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: u64,
        close_time: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        quote_volume: f64,
        num_trades: u64,
        taker_buy_volume: f64,
    ) -> Self {
        let price_change = close - open;
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            num_trades,
            taker_buy_volume,
            price_change,
            price_change_percent: ratio(price_change, open) * 100.0,
            amplitude: ratio(high - low, open) * 100.0,
            avg_price: ratio(quote_volume, volume),
            buy_ratio: ratio(taker_buy_volume, volume),
        }
    }

    /// Shorthand for pattern work where only prices matter.
    pub fn from_ohlc(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self::new(0, 0, open, high, low, close, 0.0, 0.0, 0, 0.0)
    }

    /// Signed body (close - open)
    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn body_size(&self) -> f64 {
        self.body().abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn total_length(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Binance kline row: a 12 element JSON array mixing integers and decimal strings.
#[derive(Debug, Deserialize)]
pub struct KlineRow(
    u64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    u64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    u64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    #[serde(deserialize_with = "deserialize_string_to_f64")] f64,
    IgnoredAny,
);

impl From<KlineRow> for Candle {
    fn from(row: KlineRow) -> Self {
        let KlineRow(
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
            quote_volume,
            num_trades,
            taker_buy_volume,
            _taker_buy_quote_volume,
            _,
        ) = row;

        Candle::new(
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            num_trades,
            taker_buy_volume,
        )
    }
}

fn deserialize_string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kline_row_populates_derived_fields() {
        let raw = r#"[1700000000000,"100.0","110.0","95.0","105.0","10.0",1700000059999,"1020.0",42,"4.0","410.0","0"]"#;
        let row: KlineRow = serde_json::from_str(raw).unwrap();
        let candle = Candle::from(row);

        assert_eq!(candle.open_time, 1_700_000_000_000);
        assert_eq!(candle.close_time, 1_700_000_059_999);
        assert_eq!(candle.num_trades, 42);
        assert!((candle.price_change - 5.0).abs() < 1e-9);
        assert!((candle.price_change_percent - 5.0).abs() < 1e-9);
        assert!((candle.amplitude - 15.0).abs() < 1e-9);
        assert!((candle.avg_price - 102.0).abs() < 1e-9);
        assert!((candle.buy_ratio - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_shape_helpers() {
        let candle = Candle::from_ohlc(10.0, 12.0, 7.0, 11.0);
        assert!(candle.is_bullish());
        assert!((candle.body_size() - 1.0).abs() < 1e-9);
        assert!((candle.upper_shadow() - 1.0).abs() < 1e-9);
        assert!((candle.lower_shadow() - 3.0).abs() < 1e-9);
        assert!((candle.total_length() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_volume_does_not_divide_by_zero() {
        let candle = Candle::from_ohlc(0.0, 1.0, 0.0, 1.0);
        assert_eq!(candle.avg_price, 0.0);
        assert_eq!(candle.buy_ratio, 0.0);
        assert_eq!(candle.price_change_percent, 0.0);
    }
}
