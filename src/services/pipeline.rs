use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::business_logic::aggregator::Aggregator;
use crate::business_logic::indicators::IndicatorProvider;
use crate::business_logic::patterns::PatternDetector;
use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::key_points::AiInsight;
use crate::models::market_info::{MarketInfo, Signals};
use crate::services::ai::{AiInsightAdapter, MarketContext};

/// Detect, measure, consult and aggregate for one pair's candle window.
#[derive(Clone)]
pub struct SignalPipeline {
    detector: PatternDetector,
    indicators: Arc<dyn IndicatorProvider>,
    ai: Option<AiInsightAdapter>,
    aggregator: Aggregator,
}

impl SignalPipeline {
    pub fn new(
        detector: PatternDetector,
        indicators: Arc<dyn IndicatorProvider>,
        ai: Option<AiInsightAdapter>,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            detector,
            indicators,
            ai,
            aggregator,
        }
    }

    pub async fn evaluate(
        &self,
        symbol: &str,
        interval: &str,
        candles: &[Candle],
    ) -> Result<MarketInfo, AppError> {
        let latest = candles.last().ok_or_else(|| AppError::NoCandles {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
        })?;

        let patterns = self.detector.detect(candles);
        let technical = self.indicators.snapshot(candles)?;

        // Only pay for an AI call when stage one is confident enough to use it
        let base = self.aggregator.base_recommendation(&patterns, &technical);
        let ai = match &self.ai {
            Some(adapter) if adapter.is_enabled() => {
                if self.aggregator.wants_ai(&base) {
                    let context = MarketContext {
                        symbol,
                        interval,
                        latest,
                        indicators: &technical,
                        patterns: &patterns,
                    };
                    adapter.analyze(&context).await
                } else {
                    AiInsight::Skipped
                }
            }
            _ => AiInsight::Disabled,
        };

        let recommendation = self.aggregator.aggregate(&patterns, &technical, Some(&ai));

        tracing::debug!(
            "{} {}: score {:+.1}, confidence {:.1}%, {}",
            symbol,
            interval,
            recommendation.score,
            recommendation.confidence,
            recommendation.action
        );

        Ok(MarketInfo {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            timestamp: Utc
                .timestamp_millis_opt(latest.open_time as i64)
                .single()
                .unwrap_or_else(Utc::now),
            price: latest.close,
            price_change: latest.price_change,
            price_change_percent: latest.price_change_percent,
            volume: latest.volume,
            signals: Signals {
                patterns,
                technical,
                ai,
                recommendation,
            },
        })
    }
}
