use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::patterns::PatternSet;
use crate::models::indicators::IndicatorSnapshot;
use crate::models::key_points::AiInsight;
use crate::models::recommendation::Recommendation;

/// Everything computed for one pair in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct Signals {
    pub patterns: PatternSet,
    pub technical: IndicatorSnapshot,
    pub ai: AiInsight,
    pub recommendation: Recommendation,
}

/// Record handed to every subscriber callback.
#[derive(Debug, Clone, Serialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub interval: String,
    /// Open time of the latest candle
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub volume: f64,
    pub signals: Signals,
}
