use serde::Serialize;
use std::collections::BTreeMap;

pub const RSI: &str = "rsi";
pub const MACD: &str = "macd";
pub const MACD_SIGNAL: &str = "macd_signal";
pub const TREND: &str = "trend";

pub const TREND_STRONG_UP: &str = "strong up";
pub const TREND_STRONG_DOWN: &str = "strong down";

/// A single indicator reading: most are numbers, a few (trend) are labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Number(f64),
    Label(String),
}

/// Read-only name -> value mapping produced by an indicator provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndicatorSnapshot {
    values: BTreeMap<String, IndicatorValue>,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a numeric reading. Non-finite values are dropped.
    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.insert_number(name, value);
        self
    }

    pub fn with_label(mut self, name: &str, label: impl Into<String>) -> Self {
        self.insert_label(name, label);
        self
    }

    pub fn insert_number(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.values
                .insert(name.to_string(), IndicatorValue::Number(value));
        }
    }

    pub fn insert_label(&mut self, name: &str, label: impl Into<String>) {
        self.values
            .insert(name.to_string(), IndicatorValue::Label(label.into()));
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            IndicatorValue::Number(value) => Some(*value),
            IndicatorValue::Label(_) => None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            IndicatorValue::Label(label) => Some(label.as_str()),
            IndicatorValue::Number(_) => None,
        }
    }

    pub fn rsi(&self) -> Option<f64> {
        self.number(RSI)
    }

    /// MACD line and its signal line, only when both are present.
    pub fn macd(&self) -> Option<(f64, f64)> {
        Some((self.number(MACD)?, self.number(MACD_SIGNAL)?))
    }

    pub fn trend(&self) -> Option<&str> {
        self.label(TREND)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
