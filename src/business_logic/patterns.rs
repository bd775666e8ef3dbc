use serde::Serialize;
use std::fmt;

use crate::business_logic::config::PatternConfig;
use crate::models::candle::Candle;

/// Max shadow-to-body ratio for the "short" shadow of hammer-like candles
const SHORT_SHADOW_BODY_RATIO: f64 = 0.3;
/// Max body of a star candle relative to the first candle's body
const STAR_BODY_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandlePattern {
    Hammer,
    ShootingStar,
    HangingMan,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
    TweezerBottom,
}

impl CandlePattern {
    pub fn name(&self) -> &'static str {
        match self {
            CandlePattern::Hammer => "Hammer",
            CandlePattern::ShootingStar => "Shooting Star",
            CandlePattern::HangingMan => "Hanging Man",
            CandlePattern::BullishEngulfing => "Bullish Engulfing",
            CandlePattern::BearishEngulfing => "Bearish Engulfing",
            CandlePattern::MorningStar => "Morning Star",
            CandlePattern::EveningStar => "Evening Star",
            CandlePattern::TweezerBottom => "Tweezer Bottom",
        }
    }
}

impl fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Patterns that fired on the latest candles, split by direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternSet {
    pub bullish: Vec<CandlePattern>,
    pub bearish: Vec<CandlePattern>,
}

impl PatternSet {
    pub fn len(&self) -> usize {
        self.bullish.len() + self.bearish.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullish.is_empty() && self.bearish.is_empty()
    }
}

/// Candlestick pattern detector.
///
/// Every rule compares shadows and bodies against ratios of the same candles,
/// so results do not change when all prices are scaled by a positive factor.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Evaluate the rules against the tail of `candles` (oldest first).
    ///
    /// With fewer than three candles only the single-candle rules run.
    pub fn detect(&self, candles: &[Candle]) -> PatternSet {
        let mut patterns = PatternSet::default();

        let Some(latest) = candles.last() else {
            return patterns;
        };
        let previous = candles.len().checked_sub(2).map(|idx| &candles[idx]);

        if self.is_hammer(latest) {
            patterns.bullish.push(CandlePattern::Hammer);
        }
        if self.is_shooting_star(latest) {
            patterns.bearish.push(CandlePattern::ShootingStar);
        }
        if let Some(previous) = previous {
            if self.is_hanging_man(previous, latest) {
                patterns.bearish.push(CandlePattern::HangingMan);
            }
        }

        if candles.len() < 3 {
            return patterns;
        }

        let [first, second, third] = &candles[candles.len() - 3..] else {
            return patterns;
        };

        if self.is_bullish_engulfing(second, third) {
            patterns.bullish.push(CandlePattern::BullishEngulfing);
        } else if self.is_bearish_engulfing(second, third) {
            patterns.bearish.push(CandlePattern::BearishEngulfing);
        }

        if is_morning_star(first, second, third) {
            patterns.bullish.push(CandlePattern::MorningStar);
        }
        if is_evening_star(first, second, third) {
            patterns.bearish.push(CandlePattern::EveningStar);
        }
        if self.is_tweezer_bottom(first, second, third) {
            patterns.bullish.push(CandlePattern::TweezerBottom);
        }

        patterns
    }

    fn has_long_lower_shadow(&self, candle: &Candle) -> bool {
        candle.lower_shadow() > candle.total_length() * self.config.hammer_ratio
            && candle.upper_shadow() < candle.body_size() * SHORT_SHADOW_BODY_RATIO
    }

    fn is_hammer(&self, candle: &Candle) -> bool {
        self.has_long_lower_shadow(candle) && candle.is_bullish()
    }

    fn is_shooting_star(&self, candle: &Candle) -> bool {
        candle.upper_shadow() > candle.total_length() * self.config.hammer_ratio
            && candle.lower_shadow() < candle.body_size() * SHORT_SHADOW_BODY_RATIO
            && !candle.is_bullish()
    }

    fn is_hanging_man(&self, previous: &Candle, candle: &Candle) -> bool {
        self.has_long_lower_shadow(candle) && !candle.is_bullish() && previous.close > candle.close
    }

    fn is_bullish_engulfing(&self, prev: &Candle, curr: &Candle) -> bool {
        !prev.is_bullish()
            && curr.is_bullish()
            && curr.body_size() > prev.body_size() * self.config.engulfing_ratio
            && curr.open < prev.close
            && curr.close > prev.open
    }

    fn is_bearish_engulfing(&self, prev: &Candle, curr: &Candle) -> bool {
        prev.is_bullish()
            && !curr.is_bullish()
            && curr.body_size() > prev.body_size() * self.config.engulfing_ratio
            && curr.open > prev.close
            && curr.close < prev.open
    }

    fn is_tweezer_bottom(&self, first: &Candle, second: &Candle, third: &Candle) -> bool {
        (second.low - third.low).abs() < second.total_length() * self.config.doji_size
            && !second.is_bullish()
            && third.is_bullish()
            && second.low < first.low
    }
}

fn is_morning_star(first: &Candle, second: &Candle, third: &Candle) -> bool {
    !first.is_bullish()
        && second.body_size() < first.body_size() * STAR_BODY_RATIO
        && third.is_bullish()
        // above the middle of the first body
        && third.close > first.open + first.body() / 2.0
}

fn is_evening_star(first: &Candle, second: &Candle, third: &Candle) -> bool {
    first.is_bullish()
        && second.body_size() < first.body_size() * STAR_BODY_RATIO
        && !third.is_bullish()
        && third.close < first.close - first.body() / 2.0
}
