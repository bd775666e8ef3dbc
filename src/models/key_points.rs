use serde::Serialize;

pub const DEFAULT_TREND: &str = "sideways";
pub const DEFAULT_CONFIDENCE: f64 = 50.0;
pub const DEFAULT_RISK_LEVEL: u8 = 3;

/// Structured fields pulled out of an AI commentary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyPoints {
    pub trend: String,
    /// -3 (strong bearish) ..= 3 (strong bullish)
    pub trend_score: i8,
    /// 0 ..= 100
    pub confidence: f64,
    /// Ascending
    pub support_levels: Vec<f64>,
    /// Ascending
    pub resistance_levels: Vec<f64>,
    /// Lowest stop-loss mentioned
    pub stop_loss: Option<f64>,
    /// Ascending
    pub take_profit_levels: Vec<f64>,
    /// 1 (low) ..= 5 (high)
    pub risk_level: u8,
}

impl Default for KeyPoints {
    fn default() -> Self {
        Self {
            trend: DEFAULT_TREND.to_string(),
            trend_score: 0,
            confidence: DEFAULT_CONFIDENCE,
            support_levels: Vec::new(),
            resistance_levels: Vec::new(),
            stop_loss: None,
            take_profit_levels: Vec::new(),
            risk_level: DEFAULT_RISK_LEVEL,
        }
    }
}

/// Outcome of consulting the AI for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AiInsight {
    /// AI analysis switched off in configuration
    Disabled,
    /// Not consulted because the technical signals were not confident enough
    Skipped,
    /// The call failed or the response was unusable
    Failed { error: String },
    Ready {
        analysis: String,
        key_points: KeyPoints,
    },
}

impl AiInsight {
    pub fn key_points(&self) -> Option<&KeyPoints> {
        match self {
            AiInsight::Ready { key_points, .. } => Some(key_points),
            _ => None,
        }
    }
}
