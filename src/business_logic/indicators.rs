use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, MoneyFlowIndex,
    MovingAverageConvergenceDivergence, OnBalanceVolume, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::indicators::{
    IndicatorSnapshot, MACD, MACD_SIGNAL, RSI, TREND, TREND_STRONG_DOWN, TREND_STRONG_UP,
};

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Produces the indicator snapshot the aggregator reads.
pub trait IndicatorProvider: Send + Sync {
    fn snapshot(&self, candles: &[Candle]) -> Result<IndicatorSnapshot, AppError>;
}

/// Indicator periods. A reading is only reported once the window is long
/// enough for it to have warmed up.
#[derive(Debug, Clone)]
pub struct TaIndicators {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub atr_period: usize,
    pub mfi_period: usize,
}

impl Default for TaIndicators {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_multiplier: 2.0,
            atr_period: 14,
            mfi_period: 14,
        }
    }
}

fn ta_error(error: ta::errors::TaError) -> AppError {
    AppError::Indicator(format!("{:?}", error))
}

/// Run a close-price indicator over the window and keep the last output.
fn last_close<I, O>(mut indicator: I, candles: &[Candle]) -> Option<O>
where
    I: Next<f64, Output = O>,
{
    candles.iter().map(|c| indicator.next(c.close)).last()
}

/// Run an OHLCV indicator over the window and keep the last output.
fn last_candle<'a, I, O>(mut indicator: I, candles: &'a [Candle]) -> Option<O>
where
    I: Next<&'a Candle, Output = O>,
{
    candles.iter().map(|c| indicator.next(c)).last()
}

impl IndicatorProvider for TaIndicators {
    fn snapshot(&self, candles: &[Candle]) -> Result<IndicatorSnapshot, AppError> {
        let mut snapshot = IndicatorSnapshot::new();
        let Some(latest) = candles.last() else {
            return Ok(snapshot);
        };
        let len = candles.len();
        snapshot.insert_number("close", latest.close);

        for period in [20, 50, 200] {
            if len >= period {
                let sma = SimpleMovingAverage::new(period).map_err(ta_error)?;
                if let Some(value) = last_close(sma, candles) {
                    snapshot.insert_number(&format!("sma_{}", period), value);
                }
            }
        }

        let mut emas = Vec::new();
        for period in [20, 50] {
            if len >= period {
                let ema = ExponentialMovingAverage::new(period).map_err(ta_error)?;
                if let Some(value) = last_close(ema, candles) {
                    snapshot.insert_number(&format!("ema_{}", period), value);
                    emas.push(value);
                }
            }
        }

        if len > self.rsi_period {
            let rsi = RelativeStrengthIndex::new(self.rsi_period).map_err(ta_error)?;
            if let Some(value) = last_close(rsi, candles) {
                snapshot.insert_number(RSI, value);
            }
        }

        let mut histogram = None;
        if len >= self.macd_slow + self.macd_signal {
            let macd =
                MovingAverageConvergenceDivergence::new(self.macd_fast, self.macd_slow, self.macd_signal)
                    .map_err(ta_error)?;
            if let Some(output) = last_close(macd, candles) {
                snapshot.insert_number(MACD, output.macd);
                snapshot.insert_number(MACD_SIGNAL, output.signal);
                snapshot.insert_number("macd_hist", output.histogram);
                histogram = Some(output.histogram);
            }
        }

        if len >= self.bb_period {
            let bb = BollingerBands::new(self.bb_period, self.bb_multiplier).map_err(ta_error)?;
            if let Some(output) = last_close(bb, candles) {
                snapshot.insert_number("bb_upper", output.upper);
                snapshot.insert_number("bb_middle", output.average);
                snapshot.insert_number("bb_lower", output.lower);
            }
        }

        if len > self.atr_period {
            let atr = AverageTrueRange::new(self.atr_period).map_err(ta_error)?;
            if let Some(value) = last_candle(atr, candles) {
                snapshot.insert_number("atr", value);
            }
        }

        if len > self.mfi_period {
            let mfi = MoneyFlowIndex::new(self.mfi_period).map_err(ta_error)?;
            if let Some(value) = last_candle(mfi, candles) {
                snapshot.insert_number("mfi", value);
            }
        }

        if let Some(value) = last_candle(OnBalanceVolume::new(), candles) {
            snapshot.insert_number("obv", value);
        }

        if let ([ema_20, ema_50], Some(histogram)) = (emas.as_slice(), histogram) {
            snapshot.insert_label(TREND, trend_label(latest.close, *ema_20, *ema_50, histogram));
        }

        Ok(snapshot)
    }
}

/// Price/EMA stacking confirmed by the MACD histogram.
fn trend_label(close: f64, ema_20: f64, ema_50: f64, histogram: f64) -> &'static str {
    if close > ema_20 && ema_20 > ema_50 && histogram > 0.0 {
        TREND_STRONG_UP
    } else if close < ema_20 && ema_20 < ema_50 && histogram < 0.0 {
        TREND_STRONG_DOWN
    } else if close > ema_50 {
        "up"
    } else if close < ema_50 {
        "down"
    } else {
        "sideways"
    }
}
