use serde::Serialize;
use std::fmt;

/// Final recommendation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Signals too weak or conflicting to act on
    HoldUnclear,
    StrongBuy,
    Buy,
    StrongSell,
    Sell,
    NeutralHold,
}

impl Action {
    /// Ordered table, first match wins. Low confidence overrides any score.
    pub fn from_signal(score: f64, confidence: f64) -> Self {
        if confidence < 40.0 {
            Action::HoldUnclear
        } else if score >= 4.0 && confidence >= 70.0 {
            Action::StrongBuy
        } else if score >= 2.0 {
            Action::Buy
        } else if score <= -4.0 && confidence >= 70.0 {
            Action::StrongSell
        } else if score <= -2.0 {
            Action::Sell
        } else {
            Action::NeutralHold
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::HoldUnclear => "hold, signal unclear",
            Action::StrongBuy => "strong buy",
            Action::Buy => "buy",
            Action::StrongSell => "strong sell",
            Action::Sell => "sell",
            Action::NeutralHold => "hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Positive is bullish, negative bearish
    pub score: f64,
    /// 0 ..= 100
    pub confidence: f64,
    pub action: Action,
    pub reasons: Vec<String>,
    /// AI trend mapped through the same action table, set when the blend ran
    pub ai_action: Option<Action>,
    pub ai_confidence: Option<f64>,
    /// Stage-one result before the AI blend, set when the blend ran
    pub base: Option<Box<Recommendation>>,
}

impl Recommendation {
    pub fn new(score: f64, confidence: f64, reasons: Vec<String>) -> Self {
        let confidence = clamp_confidence(confidence);
        Self {
            score,
            confidence,
            action: Action::from_signal(score, confidence),
            reasons,
            ai_action: None,
            ai_confidence: None,
            base: None,
        }
    }
}

/// Clamp to [0, 100]; NaN collapses to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
